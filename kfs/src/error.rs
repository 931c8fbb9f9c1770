use core::fmt::{self, Display};

use block_dev::BlockError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    NotFound,
    NotADirectory,
    IsADirectory,
    /// 路径分量达到或超过目录项名字段的宽度
    NameTooLong,
    /// 路径分量含有 \0，无法存入以 \0 结尾的名字段
    InvalidName,
    PermissionDenied,
    AlreadyExists,
    DirectoryNotEmpty,
    /// 没有空闲的 inode 或块
    OutOfResources,
    /// 超出直接索引与间接索引所能编号的范围
    FileTooLarge,
    TooManyOpenFiles,
    InvalidDescriptor,
    InvalidOffset,
    /// 块设备读写失败
    IoError,
    MountError,
    NotMounted,
    /// 磁盘上的结构指向了不存在的位置
    Corrupted,
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<BlockError> for Error {
    #[inline]
    fn from(_: BlockError) -> Self {
        Self::IoError
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NotFound => "no such file or directory",
            Self::NotADirectory => "not a directory",
            Self::IsADirectory => "is a directory",
            Self::NameTooLong => "file name too long",
            Self::InvalidName => "invalid file name",
            Self::PermissionDenied => "permission denied",
            Self::AlreadyExists => "file exists",
            Self::DirectoryNotEmpty => "directory not empty",
            Self::OutOfResources => "no space left on device",
            Self::FileTooLarge => "file too large",
            Self::TooManyOpenFiles => "too many open files",
            Self::InvalidDescriptor => "bad file descriptor",
            Self::InvalidOffset => "invalid offset",
            Self::IoError => "input/output error",
            Self::MountError => "cannot mount volume",
            Self::NotMounted => "volume not mounted",
            Self::Corrupted => "filesystem structure is corrupted",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}
