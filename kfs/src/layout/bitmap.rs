use alloc::vec;
use alloc::vec::Vec;

use block_dev::BlockDevice;

use crate::block_buf::BlockBuf;
use crate::{BLOCK_BITS, Error, Result};

/// 位图区域内块的结构
type BitmapBlock = [u64; BLOCK_BITS / 64];

const GROUPS_PER_BLOCK: usize = BLOCK_BITS / 64;

/// 位图，记录其指示区域的资源分配情况。
///
/// 挂载时整张位图读入内存，分配与回收时写回所在的块。
#[derive(Debug)]
pub struct Bitmap {
    /// 位图的起始块
    start_block_id: usize,
    /// 位图占用块数
    blocks: usize,
    /// 指示区域的资源总数，不超过`blocks * BLOCK_BITS`
    capacity: usize,
    groups: Vec<u64>,
}

impl Bitmap {
    #[inline]
    pub fn new(start_block_id: usize, blocks: usize, capacity: usize) -> Self {
        assert!(capacity <= blocks * BLOCK_BITS);
        Self {
            start_block_id,
            blocks,
            capacity,
            groups: vec![0; blocks * GROUPS_PER_BLOCK],
        }
    }

    /// 从块设备读入整张位图
    pub fn load(
        block_device: &dyn BlockDevice,
        start_block_id: usize,
        blocks: usize,
        capacity: usize,
    ) -> Result<Self> {
        let mut bitmap = Self::new(start_block_id, blocks, capacity);
        for (block_index, groups) in bitmap.groups.chunks_mut(GROUPS_PER_BLOCK).enumerate() {
            BlockBuf::load(block_device, start_block_id + block_index)?
                .map(0, |bitmap_block: &BitmapBlock| groups.copy_from_slice(bitmap_block));
        }

        Ok(bitmap)
    }

    pub fn get(&self, bit: u32) -> bool {
        let (group_index, ingroup_index) = Self::decode(bit);
        self.groups
            .get(group_index)
            .is_some_and(|&bits| bits & (1 << ingroup_index) != 0)
    }

    pub fn set(&mut self, bit: u32) {
        assert!((bit as usize) < self.capacity);
        let (group_index, ingroup_index) = Self::decode(bit);
        self.groups[group_index] |= 1 << ingroup_index;
    }

    pub fn clear(&mut self, bit: u32) {
        assert!((bit as usize) < self.capacity);
        let (group_index, ingroup_index) = Self::decode(bit);
        self.groups[group_index] &= !(1 << ingroup_index);
    }

    /// 自0号位起寻找第一个空闲位
    pub fn first_free(&self) -> Option<u32> {
        // 找到还有剩余空间的bit组(即还有0)
        self.groups
            .iter()
            .enumerate()
            .find_map(|(group_index, &bits)| {
                (bits != u64::MAX).then(|| group_index * 64 + bits.trailing_ones() as usize)
            })
            .filter(|&bit| bit < self.capacity)
            .map(|bit| bit as u32)
    }

    /// 分配第一个空闲位并写回所在块
    pub fn alloc(&mut self, block_device: &dyn BlockDevice) -> Result<u32> {
        let bit = self.first_free().ok_or(Error::OutOfResources)?;
        self.set(bit);
        if let Err(e) = self.sync_bit(block_device, bit) {
            self.clear(bit);
            return Err(e);
        }

        Ok(bit)
    }

    pub fn dealloc(&mut self, block_device: &dyn BlockDevice, bit: u32) -> Result<()> {
        // 编号一定得有对应的位
        if (bit as usize) >= self.capacity || !self.get(bit) {
            log::error!("freeing bit {bit} which is not allocated");
            return Err(Error::Corrupted);
        }

        self.clear(bit);
        self.sync_bit(block_device, bit)
    }

    /// 写回整张位图
    pub fn sync(&self, block_device: &dyn BlockDevice) -> Result<()> {
        (0..self.blocks).try_for_each(|block_index| self.sync_block(block_device, block_index))
    }
}

impl Bitmap {
    #[inline]
    fn decode(bit: u32) -> (usize, usize) {
        let bit = bit as usize;
        (bit / 64, bit % 64)
    }

    #[inline]
    fn sync_bit(&self, block_device: &dyn BlockDevice, bit: u32) -> Result<()> {
        self.sync_block(block_device, bit as usize / BLOCK_BITS)
    }

    fn sync_block(&self, block_device: &dyn BlockDevice, block_index: usize) -> Result<()> {
        let groups = &self.groups[block_index * GROUPS_PER_BLOCK..][..GROUPS_PER_BLOCK];
        let mut buf = BlockBuf::zeroed();
        buf.map_mut(0, |bitmap_block: &mut BitmapBlock| {
            bitmap_block.copy_from_slice(groups)
        });
        buf.store(block_device, self.start_block_id + block_index)
    }
}
