//! # 路径层
//!
//! 路径一律从根目录出发解析，空分量被忽略，故`/a//b/`与`/a/b`等价。

use alloc::vec::Vec;

use crate::block_buf::BlockBuf;
use crate::layout::{DirBlock, DirEntry, DiskInode, NAME_MAX_LEN};
use crate::volume::Volume;
use crate::{BLOCK_SIZE, Error, ROOT_INUM, Result};

/// 将路径拆分为非空分量。
///
/// 名字段以 \0 结尾，含 \0 的分量无法原样存取，一律拒绝。
pub fn components(path: &str) -> Result<Vec<&str>> {
    path.split('/')
        .filter(|name| !name.is_empty())
        .map(|name| {
            if name.len() > NAME_MAX_LEN {
                Err(Error::NameTooLong)
            } else if name.contains('\0') {
                Err(Error::InvalidName)
            } else {
                Ok(name)
            }
        })
        .collect()
}

/// 目录项在磁盘上的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPos {
    /// 目录项所在的设备块号
    pub block_id: usize,
    /// 块内下标
    pub index: usize,
    pub inum: u32,
}

impl Volume {
    /// 解析路径，返回其 inode 编号
    pub fn resolve(&mut self, path: &str) -> Result<u32> {
        components(path)?
            .into_iter()
            .try_fold(ROOT_INUM, |dir, name| self.lookup(dir, name))
    }

    /// 解析父目录，返回父目录的 inode 编号与最后一个分量。
    /// 路径指向根目录时返回 [`None`]。
    pub fn resolve_parent<'p>(&mut self, path: &'p str) -> Result<Option<(u32, &'p str)>> {
        let mut names = components(path)?;
        let Some(name) = names.pop() else {
            return Ok(None);
        };

        let parent = names
            .into_iter()
            .try_fold(ROOT_INUM, |dir, name| self.lookup(dir, name))?;
        if !self.inode(parent)?.is_dir() {
            return Err(Error::NotADirectory);
        }

        Ok(Some((parent, name)))
    }

    #[inline]
    fn lookup(&mut self, dir: u32, name: &str) -> Result<u32> {
        self.find_entry(dir, name)?
            .map(|pos| pos.inum)
            .ok_or(Error::NotFound)
    }

    /// 在目录的各个数据块中依次查找名字
    pub fn find_entry(&mut self, dir: u32, name: &str) -> Result<Option<EntryPos>> {
        let inode = self.dir_inode(dir)?;
        for block in self.block_list(&inode)? {
            let block_id = self.data_block_id(block)?;
            let dir_block = BlockBuf::load(self.block_device(), block_id)?;
            let found = dir_block.map(0, |dirents: &DirBlock| {
                dirents
                    .iter()
                    .position(|dirent| dirent.matches(name))
                    .map(|index| (index, dirents[index].inum()))
            });

            if let Some((index, inum)) = found {
                return Ok(Some(EntryPos {
                    block_id,
                    index,
                    inum,
                }));
            }
        }

        Ok(None)
    }

    /// 在目录中写入新的目录项，没有空槽位时为目录追加一个数据块。
    /// 调用者须保证名字不重复。
    pub fn insert_entry(&mut self, dir: u32, name: &str, inum: u32) -> Result<()> {
        let inode = self.dir_inode(dir)?;
        for block in self.block_list(&inode)? {
            let block_id = self.data_block_id(block)?;
            let mut buf = BlockBuf::load(self.block_device(), block_id)?;
            let inserted = buf.map_mut(0, |dirents: &mut DirBlock| {
                dirents
                    .iter_mut()
                    .find(|dirent| dirent.is_free())
                    .map(|dirent| *dirent = DirEntry::new(name, inum))
                    .is_some()
            });

            if inserted {
                buf.store(self.block_device(), block_id)?;
                self.mark_dirty(dir);
                return Ok(());
            }
        }

        let block = self.push_block(dir)?;
        let block_id = self.data_block_id(block)?;
        let mut buf = BlockBuf::zeroed();
        buf.map_mut(0, |dirents: &mut DirBlock| dirents[0] = DirEntry::new(name, inum));
        buf.store(self.block_device(), block_id)?;

        // 目录的大小恒为其数据块的总字节数
        let dir_inode = self.inode_mut(dir)?;
        dir_inode.size = dir_inode.blocks * BLOCK_SIZE as u32;
        Ok(())
    }

    /// 将目录项置为墓碑
    pub fn remove_entry(&mut self, dir: u32, pos: &EntryPos) -> Result<()> {
        let mut buf = BlockBuf::load(self.block_device(), pos.block_id)?;
        buf.map_mut(0, |dirents: &mut DirBlock| dirents[pos.index] = DirEntry::removed());
        buf.store(self.block_device(), pos.block_id)?;
        self.mark_dirty(dir);
        Ok(())
    }

    /// 目录中全部有效的目录项
    pub fn entries(&mut self, dir: u32) -> Result<Vec<DirEntry>> {
        let inode = self.dir_inode(dir)?;
        let mut entries = Vec::new();
        for block in self.block_list(&inode)? {
            let block_id = self.data_block_id(block)?;
            BlockBuf::load(self.block_device(), block_id)?.map(0, |dirents: &DirBlock| {
                entries.extend(dirents.iter().filter(|dirent| !dirent.is_free()))
            });
        }

        Ok(entries)
    }

    /// 在`path`处建立新的文件或目录，返回其 inode 编号
    pub fn create_node(&mut self, path: &str, inode: DiskInode) -> Result<u32> {
        let Some((parent, name)) = self.resolve_parent(path)? else {
            // 根目录总是存在
            return Err(Error::AlreadyExists);
        };
        if self.find_entry(parent, name)?.is_some() {
            return Err(Error::AlreadyExists);
        }

        let inum = self.alloc_inode(inode)?;
        if let Err(e) = self.insert_entry(parent, name, inum) {
            self.free_inode(inum)?;
            return Err(e);
        }

        Ok(inum)
    }

    /// 删除`path`处的文件或空目录，回收其全部块，返回被删除的 inode 编号
    pub fn remove_node(&mut self, path: &str) -> Result<u32> {
        let Some((parent, name)) = self.resolve_parent(path)? else {
            return Err(Error::PermissionDenied);
        };
        let pos = self.find_entry(parent, name)?.ok_or(Error::NotFound)?;

        if self.inode(pos.inum)?.is_dir() && !self.entries(pos.inum)?.is_empty() {
            return Err(Error::DirectoryNotEmpty);
        }

        // 先断开目录项再回收，中途失败只会泄漏 inode
        self.remove_entry(parent, &pos)?;
        self.free_inode(pos.inum)?;
        Ok(pos.inum)
    }

    fn dir_inode(&mut self, dir: u32) -> Result<DiskInode> {
        let inode = self.inode(dir)?;
        if inode.is_dir() {
            Ok(inode)
        } else {
            Err(Error::NotADirectory)
        }
    }
}
