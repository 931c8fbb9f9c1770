//! # 块缓冲
//!
//! 与块设备交换数据的最小单位是整块，[`BlockBuf`] 就是内存中的一块，
//! 读写磁盘结构时先把块读入缓冲区，再把缓冲区映射为具体的结构。
//!
//! 缓冲区按8字节对齐，映射的结构只能由整数与整数数组构成(`#[repr(C)]`)，
//! 因而任意位模式都是合法值。

use core::mem;
use core::ops::{Deref, DerefMut};

use block_dev::BlockDevice;

use crate::BLOCK_SIZE;
use crate::Result;

#[derive(Clone)]
#[repr(C, align(8))]
pub struct BlockBuf([u8; BLOCK_SIZE]);

impl BlockBuf {
    #[inline]
    pub const fn zeroed() -> Self {
        Self([0; BLOCK_SIZE])
    }

    /// 从块设备读入一块
    pub fn load(block_device: &dyn BlockDevice, block_id: usize) -> Result<Self> {
        let mut buf = Self::zeroed();
        block_device.read_block(block_id, &mut buf.0)?;
        Ok(buf)
    }

    /// 写回块设备
    #[inline]
    pub fn store(&self, block_device: &dyn BlockDevice, block_id: usize) -> Result<()> {
        block_device.write_block(block_id, &self.0)?;
        Ok(())
    }

    pub fn get<T: Copy>(&self, offset: usize) -> &T {
        Self::check::<T>(offset);
        unsafe { &*self.0.as_ptr().add(offset).cast() }
    }

    pub fn get_mut<T: Copy>(&mut self, offset: usize) -> &mut T {
        Self::check::<T>(offset);
        unsafe { &mut *self.0.as_mut_ptr().add(offset).cast() }
    }

    #[inline]
    pub fn map<T: Copy, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(offset))
    }

    #[inline]
    pub fn map_mut<T: Copy, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }
}

impl BlockBuf {
    #[inline]
    fn check<T>(offset: usize) {
        assert!(mem::size_of::<T>() + offset <= BLOCK_SIZE);
        assert_eq!(offset % mem::align_of::<T>(), 0);
        assert!(mem::align_of::<T>() <= mem::align_of::<Self>());
    }
}

impl Deref for BlockBuf {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for BlockBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
