//! # 表缓存层
//!
//! 索引节点表与间接块表都是磁盘上连续存放的定长表项，
//! 内存中只保留一个容量固定的窗口。窗口内的每个槽位记录
//! 表项编号、表项内容、脏标记与访问标记。
//!
//! - 命中：直接返回槽位内容；
//! - 缺失：只读入表项所在的那一块，取出表项放入槽位；
//! - 窗口已满：按时钟算法挑选牺牲槽位，脏槽位先写回再复用。
//!
//! 同一表项在内存中至多有一份拷贝。

use alloc::vec::Vec;
use core::mem;

use block_dev::BlockDevice;

use crate::block_buf::BlockBuf;
use crate::layout::{DiskInode, IndirectBlock};
use crate::{BLOCK_SIZE, Error, Result};

/// 可被缓存的表项
pub trait Record: Copy + Default {
    /// 每块容纳的表项数
    const PER_BLOCK: usize;
}

impl Record for DiskInode {
    const PER_BLOCK: usize = BLOCK_SIZE / mem::size_of::<DiskInode>();
}

impl Record for IndirectBlock {
    const PER_BLOCK: usize = 1;
}

#[derive(Debug)]
struct Slot<T> {
    id: u32,
    value: T,
    dirty: bool,
    /// 时钟算法的访问位
    referenced: bool,
}

#[derive(Debug)]
pub struct TableCache<T> {
    /// 表在磁盘上的起始块
    start_block_id: usize,
    /// 表项总数
    len: usize,
    /// 窗口的槽位上限
    capacity: usize,
    slots: Vec<Slot<T>>,
    /// 时钟指针
    hand: usize,
}

impl<T: Record> TableCache<T> {
    pub fn new(start_block_id: usize, len: usize, capacity: usize) -> Self {
        let capacity = capacity.clamp(1, len.max(1));
        Self {
            start_block_id,
            len,
            capacity,
            slots: Vec::with_capacity(capacity),
            hand: 0,
        }
    }

    /// 读入表开头的若干块填满窗口，窗口之外的表项留待按需读入
    pub fn preload(&mut self, block_device: &dyn BlockDevice) -> Result<()> {
        let count = self.capacity.min(self.len);
        for block_index in 0..count.div_ceil(T::PER_BLOCK) {
            let buf = BlockBuf::load(block_device, self.start_block_id + block_index)?;
            let first = block_index * T::PER_BLOCK;
            for id in first..(first + T::PER_BLOCK).min(count) {
                let value = *buf.get::<T>(Self::inblock_offset(id as u32));
                if self.position(id as u32).is_none() {
                    self.slots.push(Slot {
                        id: id as u32,
                        value,
                        dirty: false,
                        referenced: false,
                    });
                }
            }
        }

        Ok(())
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 只在内存中查找
    #[cfg(test)]
    pub fn lookup(&self, id: u32) -> Option<&T> {
        self.position(id).map(|index| &self.slots[index].value)
    }

    #[cfg(test)]
    pub fn is_dirty(&self, id: u32) -> bool {
        self.position(id)
            .is_some_and(|index| self.slots[index].dirty)
    }

    pub fn get(&mut self, id: u32, block_device: &dyn BlockDevice) -> Result<&T> {
        let index = self.fault_in(id, block_device)?;
        Ok(&self.slots[index].value)
    }

    /// 获取可变引用，并将表项标记为脏
    pub fn get_mut(&mut self, id: u32, block_device: &dyn BlockDevice) -> Result<&mut T> {
        let index = self.fault_in(id, block_device)?;
        let slot = &mut self.slots[index];
        slot.dirty = true;
        Ok(&mut slot.value)
    }

    /// 表项不在窗口内时什么都不做
    pub fn mark_dirty(&mut self, id: u32) {
        if let Some(index) = self.position(id) {
            self.slots[index].dirty = true;
        }
    }

    /// 放入新分配的表项，不读磁盘；内容视为脏
    pub fn insert(&mut self, id: u32, value: T, block_device: &dyn BlockDevice) -> Result<()> {
        self.check_id(id)?;
        let index = match self.position(id) {
            Some(index) => index,
            None => self.vacant_slot(id, value, block_device)?,
        };
        let slot = &mut self.slots[index];
        slot.value = value;
        slot.dirty = true;
        slot.referenced = true;

        Ok(())
    }

    /// 写回所有脏表项。出错时继续写回其余表项，返回第一个错误。
    pub fn flush(&mut self, block_device: &dyn BlockDevice) -> Result<()> {
        let mut result = Ok(());
        for index in 0..self.slots.len() {
            if !self.slots[index].dirty {
                continue;
            }
            match self.write_back(index, block_device) {
                Ok(()) => self.slots[index].dirty = false,
                Err(e) => {
                    log::error!(
                        "failed to write back entry {} at block {}: {e}",
                        self.slots[index].id,
                        self.block_id(self.slots[index].id)
                    );
                    result = result.and(Err(e));
                }
            }
        }

        result
    }
}

impl<T: Record> TableCache<T> {
    #[inline]
    fn position(&self, id: u32) -> Option<usize> {
        self.slots.iter().position(|slot| slot.id == id)
    }

    #[inline]
    fn check_id(&self, id: u32) -> Result<()> {
        if (id as usize) < self.len {
            Ok(())
        } else {
            log::error!("table entry {id} is out of bounds (len {})", self.len);
            Err(Error::Corrupted)
        }
    }

    /// 表项所在块
    #[inline]
    fn block_id(&self, id: u32) -> usize {
        self.start_block_id + id as usize / T::PER_BLOCK
    }

    /// 表项的块内偏移
    #[inline]
    fn inblock_offset(id: u32) -> usize {
        id as usize % T::PER_BLOCK * mem::size_of::<T>()
    }

    fn fault_in(&mut self, id: u32, block_device: &dyn BlockDevice) -> Result<usize> {
        if let Some(index) = self.position(id) {
            self.slots[index].referenced = true;
            return Ok(index);
        }

        self.check_id(id)?;
        log::trace!("table cache miss: entry {id}");
        let value = BlockBuf::load(block_device, self.block_id(id))?
            .map(Self::inblock_offset(id), |value: &T| *value);

        let index = self.vacant_slot(id, value, block_device)?;
        self.slots[index].referenced = true;
        Ok(index)
    }

    /// 取得一个存放`id`的槽位：窗口未满则追加，否则淘汰一个槽位
    fn vacant_slot(&mut self, id: u32, value: T, block_device: &dyn BlockDevice) -> Result<usize> {
        let slot = Slot {
            id,
            value,
            dirty: false,
            referenced: false,
        };

        if self.slots.len() < self.capacity {
            self.slots.push(slot);
            return Ok(self.slots.len() - 1);
        }

        let victim = self.evict(block_device)?;
        self.slots[victim] = slot;
        Ok(victim)
    }

    /// 时钟算法：访问位为真则清除并跳过，否则淘汰；脏槽位先写回。
    /// 写回失败时牺牲槽位保持原样。
    fn evict(&mut self, block_device: &dyn BlockDevice) -> Result<usize> {
        loop {
            let index = self.hand;
            self.hand = (self.hand + 1) % self.slots.len();

            let slot = &mut self.slots[index];
            if slot.referenced {
                slot.referenced = false;
                continue;
            }

            log::trace!("table cache evicts entry {}", slot.id);
            if slot.dirty {
                self.write_back(index, block_device)?;
                self.slots[index].dirty = false;
            }
            return Ok(index);
        }
    }

    /// 写回一个槽位；一块存放多个表项时先读出整块再修改
    fn write_back(&self, index: usize, block_device: &dyn BlockDevice) -> Result<()> {
        let slot = &self.slots[index];
        let block_id = self.block_id(slot.id);
        let mut buf = if T::PER_BLOCK > 1 {
            BlockBuf::load(block_device, block_id)?
        } else {
            BlockBuf::zeroed()
        };
        *buf.get_mut::<T>(Self::inblock_offset(slot.id)) = slot.value;
        buf.store(block_device, block_id)
    }
}
