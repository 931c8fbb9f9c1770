use alloc::vec::Vec;

use crate::file::OpenFile;
use crate::{Error, Result};

/// 打开文件表：文件描述符即槽位的索引，总是复用最小的空槽位
#[derive(Debug, Clone)]
pub struct FdTable {
    slots: Vec<Option<OpenFile>>,
    capacity: usize,
}

impl FdTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            capacity,
        }
    }

    /// 插入至空槽位，返回文件描述符
    pub fn insert(&mut self, file: OpenFile) -> Result<usize> {
        let fd = match self.slots.iter().position(Option::is_none) {
            Some(fd) => fd,
            None if self.slots.len() < self.capacity => {
                self.slots.push(None);
                self.slots.len() - 1
            }
            None => return Err(Error::TooManyOpenFiles),
        };

        self.slots[fd] = Some(file);
        Ok(fd)
    }

    pub fn get(&self, fd: usize) -> Result<&OpenFile> {
        self.slots
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidDescriptor)
    }

    pub fn get_mut(&mut self, fd: usize) -> Result<&mut OpenFile> {
        self.slots
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidDescriptor)
    }

    pub fn remove(&mut self, fd: usize) -> Result<OpenFile> {
        self.slots
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(Error::InvalidDescriptor)
    }

    /// 关闭所有不满足条件的文件
    pub fn retain(&mut self, mut f: impl FnMut(&OpenFile) -> bool) {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|file| !f(file)) {
                *slot = None;
            }
        }
    }

    /// 正在使用的描述符数
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
