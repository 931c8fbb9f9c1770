use core::mem;

use crate::layout::DiskInode;
use crate::{BLOCK_BITS, BLOCK_SIZE, MAGIC, SUPER_BLOCK_ID};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位其它连续区域
///
/// 所有区域都以块号记录，字节偏移即`块号 * block_size`，天然按块对齐。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    pub block_size: u32,
    pub inode_size: u32,
    pub inodes_per_block: u32,
    /// 文件系统占据块数
    pub total_blocks: u32,
    pub max_inodes: u32,
    pub max_data_blocks: u32,
    pub max_indirect_blocks: u32,
    pub inode_bitmap_start: u32,
    pub inode_bitmap_blocks: u32,
    pub data_bitmap_start: u32,
    pub data_bitmap_blocks: u32,
    pub indirect_bitmap_start: u32,
    pub indirect_bitmap_blocks: u32,
    pub inode_table_start: u32,
    pub inode_table_blocks: u32,
    /// 间接块表：第 i 个间接块位于`indirect_table_start + i`
    pub indirect_table_start: u32,
    /// 数据块区域：第 i 个数据块位于`data_area_start + i`
    pub data_area_start: u32,
}

impl SuperBlock {
    /// 依据总块数与两张表的容量推算布局，剩余空间全部划给数据块。
    /// 空间不足时返回空。
    pub fn new(total_blocks: u32, max_inodes: u32, max_indirect_blocks: u32) -> Option<Self> {
        if max_inodes == 0 {
            return None;
        }

        let inode_size = mem::size_of::<DiskInode>() as u32;
        let inodes_per_block = BLOCK_SIZE as u32 / inode_size;
        let bits = BLOCK_BITS as u32;

        let inode_bitmap_blocks = max_inodes.div_ceil(bits);
        let indirect_bitmap_blocks = max_indirect_blocks.div_ceil(bits);
        let inode_table_blocks = max_inodes.div_ceil(inodes_per_block);

        let reserved = SUPER_BLOCK_ID as u32 + 1;
        let used = reserved
            .checked_add(inode_bitmap_blocks)?
            .checked_add(indirect_bitmap_blocks)?
            .checked_add(inode_table_blocks)?
            .checked_add(max_indirect_blocks)?;

        // 剩下的块分给数据块位图与数据块，每个位图块可指示 BLOCK_BITS 个数据块
        let data_total_blocks = total_blocks.checked_sub(used)?;
        let data_bitmap_blocks =
            ((data_total_blocks as u64 + bits as u64) / (bits as u64 + 1)) as u32;
        let max_data_blocks = data_total_blocks - data_bitmap_blocks;
        if max_data_blocks == 0 {
            return None;
        }

        let inode_bitmap_start = reserved;
        let data_bitmap_start = inode_bitmap_start + inode_bitmap_blocks;
        let indirect_bitmap_start = data_bitmap_start + data_bitmap_blocks;
        let inode_table_start = indirect_bitmap_start + indirect_bitmap_blocks;
        let indirect_table_start = inode_table_start + inode_table_blocks;
        let data_area_start = indirect_table_start + max_indirect_blocks;

        Some(Self {
            magic: MAGIC,
            block_size: BLOCK_SIZE as u32,
            inode_size,
            inodes_per_block,
            total_blocks,
            max_inodes,
            max_data_blocks,
            max_indirect_blocks,
            inode_bitmap_start,
            inode_bitmap_blocks,
            data_bitmap_start,
            data_bitmap_blocks,
            indirect_bitmap_start,
            indirect_bitmap_blocks,
            inode_table_start,
            inode_table_blocks,
            indirect_table_start,
            data_area_start,
        })
    }

    /// 校验魔数与布局；`device_blocks`为块设备的实际容量
    pub fn is_valid(&self, device_blocks: usize) -> bool {
        let bits = BLOCK_BITS as u64;
        let end = |start: u32, blocks: u32| start as u64 + blocks as u64;

        self.magic == MAGIC
            && self.block_size as usize == BLOCK_SIZE
            && self.inode_size as usize == mem::size_of::<DiskInode>()
            && self.inodes_per_block == self.block_size / self.inode_size
            && self.max_inodes > 0
            && self.inode_bitmap_blocks as u64 * bits >= self.max_inodes as u64
            && self.data_bitmap_blocks as u64 * bits >= self.max_data_blocks as u64
            && self.indirect_bitmap_blocks as u64 * bits >= self.max_indirect_blocks as u64
            && self.inode_table_blocks as u64 * self.inodes_per_block as u64
                >= self.max_inodes as u64
            // 各区域依次排列，互不重叠
            && self.inode_bitmap_start as usize > SUPER_BLOCK_ID
            && self.data_bitmap_start as u64
                >= end(self.inode_bitmap_start, self.inode_bitmap_blocks)
            && self.indirect_bitmap_start as u64
                >= end(self.data_bitmap_start, self.data_bitmap_blocks)
            && self.inode_table_start as u64
                >= end(self.indirect_bitmap_start, self.indirect_bitmap_blocks)
            && self.indirect_table_start as u64
                >= end(self.inode_table_start, self.inode_table_blocks)
            && self.data_area_start as u64
                >= end(self.indirect_table_start, self.max_indirect_blocks)
            && end(self.data_area_start, self.max_data_blocks) <= self.total_blocks as u64
            && self.total_blocks as usize <= device_blocks
    }
}
