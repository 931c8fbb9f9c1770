//! # 文件读写
//!
//! 一次传输被拆为至多三段：首部不满块、若干整块、尾部不满块。
//! 不满块须先读出整块再改写，整块直接覆盖。

use crate::block_buf::BlockBuf;
use crate::layout::{DiskInode, MAX_FILE_BLOCKS, Perm};
use crate::volume::Volume;
use crate::{BLOCK_SIZE, Error, Result};

/// 打开方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    /// 每次写入前光标先移到文件末尾
    Append,
    ReadWrite,
}

impl OpenMode {
    /// 打开时 inode 须具备的权限位
    #[inline]
    pub fn required(self) -> Perm {
        match self {
            Self::Read => Perm::Read,
            Self::Write => Perm::Write,
            Self::Append => Perm::Append,
            Self::ReadWrite => Perm::ReadWrite,
        }
    }

    #[inline]
    pub fn readable(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    #[inline]
    pub fn writable(self) -> bool {
        matches!(self, Self::Write | Self::Append | Self::ReadWrite)
    }
}

/// 打开的文件：只记 inode 编号，元数据总是经由缓存读取
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFile {
    pub inum: u32,
    pub offset: usize,
    pub mode: OpenMode,
}

impl OpenFile {
    #[inline]
    pub fn new(inum: u32, mode: OpenMode) -> Self {
        Self {
            inum,
            offset: 0,
            mode,
        }
    }
}

/// 文件内第`index`块上`[start, start + len)`的一段传输
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub len: usize,
}

impl Chunk {
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == BLOCK_SIZE
    }
}

/// 按块边界切分字节区间
#[derive(Debug, Clone)]
pub struct Chunks {
    offset: usize,
    end: usize,
}

#[inline]
pub fn chunks(offset: usize, len: usize) -> Chunks {
    Chunks {
        offset,
        end: offset + len,
    }
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.end {
            return None;
        }

        let index = self.offset / BLOCK_SIZE;
        let start = self.offset % BLOCK_SIZE;
        let len = (BLOCK_SIZE - start).min(self.end - self.offset);
        self.offset += len;

        Some(Chunk { index, start, len })
    }
}

impl Volume {
    /// 自光标处读取，至多读到文件末尾。光标在末尾或之后时返回0。
    pub fn read_file(&mut self, file: &mut OpenFile, buf: &mut [u8]) -> Result<usize> {
        let inode = self.inode(file.inum)?;
        let size = inode.size as usize;
        if file.offset >= size || buf.is_empty() {
            return Ok(0);
        }

        let len = buf.len().min(size - file.offset);
        let mut read = 0;
        for chunk in chunks(file.offset, len) {
            let block = self.block_of(&inode, chunk.index)?;
            let block_id = self.data_block_id(block)?;
            let data = BlockBuf::load(self.block_device(), block_id)?;
            buf[read..read + chunk.len]
                .copy_from_slice(&data[chunk.start..chunk.start + chunk.len]);

            read += chunk.len;
            file.offset += chunk.len;
        }

        Ok(read)
    }

    /// 自光标处写入，文件按需增长。
    ///
    /// 出错时已完成的部分保留，光标与文件大小只反映已完成的部分。
    pub fn write_file(&mut self, file: &mut OpenFile, buf: &[u8]) -> Result<usize> {
        if file.mode == OpenMode::Append {
            file.offset = self.inode(file.inum)?.size as usize;
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let end = file
            .offset
            .checked_add(buf.len())
            .filter(|&end| end <= MAX_FILE_BLOCKS * BLOCK_SIZE)
            .ok_or(Error::FileTooLarge)?;

        // 先备齐数据块，新块已清零，光标越过末尾留下的空洞读出为0
        let needed = DiskInode::count_data_block(end);
        while (self.inode(file.inum)?.blocks as usize) < needed {
            self.push_block(file.inum)?;
        }
        let inode = self.inode(file.inum)?;

        let mut written = 0;
        for chunk in chunks(file.offset, buf.len()) {
            let block = self.block_of(&inode, chunk.index)?;
            let block_id = self.data_block_id(block)?;
            let mut data = if chunk.is_full() {
                BlockBuf::zeroed()
            } else {
                BlockBuf::load(self.block_device(), block_id)?
            };
            data[chunk.start..chunk.start + chunk.len]
                .copy_from_slice(&buf[written..written + chunk.len]);
            data.store(self.block_device(), block_id)?;

            written += chunk.len;
            file.offset += chunk.len;
            let inode = self.inode_mut(file.inum)?;
            inode.size = inode.size.max(file.offset as u32);
        }

        Ok(written)
    }
}
