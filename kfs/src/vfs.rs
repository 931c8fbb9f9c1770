//! # 接口层
//!
//! 内核持有唯一的 [`FileSystem`]，每次调用都在同一把锁内完成，
//! 守卫离开作用域时自动解锁，提前返回的错误路径也不例外。

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use enumflags2::{BitFlags, bitflags};
use spin::Mutex;

use crate::file::{OpenFile, OpenMode};
use crate::layout::{DiskInode, DiskInodeKind, Perm, SuperBlock};
use crate::volume::{FormatOptions, Volume};
use crate::{Error, Result};

#[derive(Debug, Default)]
pub struct FileSystem {
    volume: Mutex<Option<Volume>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub inum: u32,
    pub kind: StatKind,
    pub size: u32,
    /// 占用的数据块数
    pub blocks: u32,
    pub owner: u32,
    pub perms: BitFlags<Perm>,
}

#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatKind {
    DIR = 0o040000,
    #[default]
    FILE = 0o100000,
}

/// 目录列表中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub inum: u32,
    pub kind: StatKind,
}

impl FileSystem {
    pub const fn new() -> Self {
        Self {
            volume: Mutex::new(None),
        }
    }

    /// 在块设备上建立空的文件系统，设备不必已挂载
    pub fn format(
        block_device: &Arc<dyn BlockDevice>,
        options: FormatOptions,
    ) -> Result<SuperBlock> {
        Volume::format(block_device, options)
    }

    /// 挂载块设备。两个预算分别决定 inode 表与间接块表常驻内存的部分。
    pub fn mount(
        &self,
        block_device: Arc<dyn BlockDevice>,
        inode_cache_bytes: usize,
        indirect_cache_bytes: usize,
    ) -> Result<()> {
        let mut volume = self.volume.lock();
        if volume.is_some() {
            log::warn!("file system is already mounted");
            return Err(Error::MountError);
        }

        *volume = Some(Volume::mount(
            block_device,
            inode_cache_bytes,
            indirect_cache_bytes,
        )?);
        Ok(())
    }

    /// 写回全部元数据后卸载，打开的文件随之关闭。
    ///
    /// 写回失败时保持挂载，以便重试。
    pub fn unmount(&self) -> Result<()> {
        let mut guard = self.volume.lock();
        let Some(volume) = guard.as_mut() else {
            log::warn!("unmounting a file system that is not mounted");
            return Ok(());
        };

        if let Err(e) = volume.flush() {
            log::error!("write-back failed, still mounted: {e}");
            return Err(e);
        }

        if !volume.files.is_empty() {
            log::warn!("unmounting with {} open files", volume.files.len());
        }
        *guard = None;
        log::info!("unmounted");
        Ok(())
    }

    #[inline]
    pub fn is_mounted(&self) -> bool {
        self.volume.lock().is_some()
    }

    /// 写回全部元数据，不卸载
    pub fn sync(&self) -> Result<()> {
        self.exclusive_session(Volume::flush)
    }

    pub fn super_block(&self) -> Result<SuperBlock> {
        self.exclusive_session(|volume| Ok(*volume.super_block()))
    }

    /// 解析路径，返回其 inode 编号
    pub fn resolve(&self, path: &str) -> Result<u32> {
        self.exclusive_session(|volume| volume.resolve(path))
    }

    /// 打开文件，返回文件描述符，光标位于文件开头
    pub fn open(&self, path: &str, mode: OpenMode) -> Result<usize> {
        self.exclusive_session(|volume| {
            let inum = volume.resolve(path)?;
            let inode = volume.inode(inum)?;
            if inode.is_dir() && mode != OpenMode::Read {
                return Err(Error::IsADirectory);
            }
            if !inode.perms().contains(mode.required()) {
                return Err(Error::PermissionDenied);
            }

            let fd = volume.files.insert(OpenFile::new(inum, mode))?;
            log::debug!("open {path} as fd {fd} ({mode:?})");
            Ok(fd)
        })
    }

    /// 自光标处读取，返回读到的字节数；到达文件末尾时返回0
    pub fn read(&self, fd: usize, buf: &mut [u8]) -> Result<usize> {
        self.exclusive_session(|volume| {
            let mut file = *volume.files.get(fd)?;
            if !file.mode.readable() {
                return Err(Error::PermissionDenied);
            }

            let read = volume.read_file(&mut file, buf);
            volume.files.get_mut(fd)?.offset = file.offset;
            read
        })
    }

    /// 自光标处写入，返回写入的字节数。以追加方式打开时总是写在末尾。
    pub fn write(&self, fd: usize, buf: &[u8]) -> Result<usize> {
        self.exclusive_session(|volume| {
            let mut file = *volume.files.get(fd)?;
            if !file.mode.writable() {
                return Err(Error::PermissionDenied);
            }

            let written = volume.write_file(&mut file, buf);
            volume.files.get_mut(fd)?.offset = file.offset;
            if let Err(e) = written {
                log::warn!("write to fd {fd} stopped at offset {}: {e}", file.offset);
            }
            written
        })
    }

    /// 将光标移动`delta`字节，返回新的位置。允许越过文件末尾。
    pub fn seek(&self, fd: usize, delta: isize) -> Result<usize> {
        self.exclusive_session(|volume| {
            let file = volume.files.get_mut(fd)?;
            file.offset = file
                .offset
                .checked_add_signed(delta)
                .ok_or(Error::InvalidOffset)?;
            Ok(file.offset)
        })
    }

    pub fn close(&self, fd: usize) -> Result<()> {
        self.exclusive_session(|volume| {
            volume.files.remove(fd)?;
            log::debug!("close fd {fd}");
            Ok(())
        })
    }

    /// 创建空文件，返回其 inode 编号
    pub fn create(&self, path: &str, perms: BitFlags<Perm>) -> Result<u32> {
        self.exclusive_session(|volume| {
            let inum = volume.create_node(path, DiskInode::new(DiskInodeKind::File, perms))?;
            log::debug!("create {path} as inode {inum}");
            Ok(inum)
        })
    }

    /// 创建空目录，目录总是具备全部权限
    pub fn mkdir(&self, path: &str) -> Result<u32> {
        self.exclusive_session(|volume| {
            let inum = volume
                .create_node(path, DiskInode::new(DiskInodeKind::Directory, BitFlags::all()))?;
            log::debug!("mkdir {path} as inode {inum}");
            Ok(inum)
        })
    }

    /// 删除文件或空目录；指向它的文件描述符一并失效
    pub fn delete(&self, path: &str) -> Result<()> {
        self.exclusive_session(|volume| {
            let inum = volume.remove_node(path)?;
            volume.files.retain(|file| file.inum != inum);
            log::debug!("delete {path} (inode {inum})");
            Ok(())
        })
    }

    pub fn stat(&self, path: &str) -> Result<Stat> {
        self.exclusive_session(|volume| {
            let inum = volume.resolve(path)?;
            Ok(Stat::new(inum, &volume.inode(inum)?))
        })
    }

    pub fn fstat(&self, fd: usize) -> Result<Stat> {
        self.exclusive_session(|volume| {
            let inum = volume.files.get(fd)?.inum;
            Ok(Stat::new(inum, &volume.inode(inum)?))
        })
    }

    /// 列出目录中的全部有效项
    pub fn read_dir(&self, path: &str) -> Result<Vec<DirEntryInfo>> {
        self.exclusive_session(|volume| {
            let dir = volume.resolve(path)?;
            volume
                .entries(dir)?
                .into_iter()
                .map(|dirent| {
                    let kind = volume.inode(dirent.inum())?.kind().into();
                    Ok(DirEntryInfo {
                        name: String::from_utf8_lossy(dirent.name_bytes()).into_owned(),
                        inum: dirent.inum(),
                        kind,
                    })
                })
                .collect()
        })
    }
}

impl FileSystem {
    /// 持锁执行一次操作，未挂载时直接返回错误
    fn exclusive_session<F, V>(&self, f: F) -> Result<V>
    where
        F: FnOnce(&mut Volume) -> Result<V>,
    {
        let mut volume = self.volume.lock();
        let volume = volume.as_mut().ok_or(Error::NotMounted)?;
        f(volume)
    }
}

impl Stat {
    fn new(inum: u32, inode: &DiskInode) -> Self {
        Self {
            inum,
            kind: inode.kind().into(),
            size: inode.size,
            blocks: inode.blocks,
            owner: inode.owner,
            perms: inode.perms(),
        }
    }
}

impl From<DiskInodeKind> for StatKind {
    fn from(kind: DiskInodeKind) -> Self {
        match kind {
            DiskInodeKind::File => Self::FILE,
            DiskInodeKind::Directory => Self::DIR,
        }
    }
}
