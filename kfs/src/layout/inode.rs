//! 索引节点与间接索引块
//!
//! - 直接索引：inode 内连续存储 [`DIRECT_COUNT`] 个**数据块编号**
//! - 间接索引：inode 内存储至多 [`INDIRECT_COUNT`] 个**间接块编号**，
//!   每个间接块整块连续存储 [`PTRS_PER_INDIRECT`] 个数据块编号
//!
//! 目录的空间用于存放子项的元信息；
//! 文件的空间用于存放它的数据。
//!
//! ## 块索引编码
//!
//! 文件内第 i 块（逻辑索引）：
//! - `i < DIRECT_COUNT`：位于`direct[i]`
//! - 否则记`j = i - DIRECT_COUNT`，位于第`j / PTRS_PER_INDIRECT`个间接块的
//!   第`j % PTRS_PER_INDIRECT`项

use enumflags2::{BitFlags, bitflags};

use crate::BLOCK_SIZE;

/// 直接索引块可编号数量
pub const DIRECT_COUNT: usize = 22;
/// inode 可持有的间接块数量
pub const INDIRECT_COUNT: usize = 4;
/// 间接块的编号容量
pub const PTRS_PER_INDIRECT: usize = BLOCK_SIZE / 4;
/// 单个文件最多占用的数据块数
pub const MAX_FILE_BLOCKS: usize = DIRECT_COUNT + INDIRECT_COUNT * PTRS_PER_INDIRECT;

/// 磁盘上的 inode，恒为128字节
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct DiskInode {
    // 不用usize是为了严控布局
    pub size: u32,
    /// 类型，见 [`DiskInodeKind`]
    pub(crate) kind: u32,
    pub owner: u32,
    /// 已使用的数据块数
    pub blocks: u32,
    /// 权限位，见 [`Perm`]
    pub(crate) perms: u32,
    /// 已使用的间接块数
    pub indirect_count: u32,
    pub direct: [u32; DIRECT_COUNT],
    pub indirect: [u32; INDIRECT_COUNT],
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum DiskInodeKind {
    #[default]
    File,
    Directory,
}

/// 四个粗粒度的访问位
#[rustfmt::skip]
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perm {
    Read      = 0b0001,
    Write     = 0b0010,
    Append    = 0b0100,
    ReadWrite = 0b1000,
}

/// 间接块：整块都是数据块编号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct IndirectBlock(pub [u32; PTRS_PER_INDIRECT]);

impl DiskInode {
    #[inline]
    pub fn new(kind: DiskInodeKind, perms: BitFlags<Perm>) -> Self {
        Self {
            kind: kind as u32,
            perms: perms.bits() as u32,
            ..Default::default()
        }
    }

    #[inline]
    pub fn kind(&self) -> DiskInodeKind {
        if self.kind == DiskInodeKind::Directory as u32 {
            DiskInodeKind::Directory
        } else {
            DiskInodeKind::File
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == DiskInodeKind::Directory
    }

    /// 磁盘上多余的位被忽略
    #[inline]
    pub fn perms(&self) -> BitFlags<Perm> {
        BitFlags::from_bits_truncate(self.perms as u8)
    }

    /// 直接索引中正在使用的部分
    #[inline]
    pub fn direct_blocks(&self) -> &[u32] {
        &self.direct[..(self.blocks as usize).min(DIRECT_COUNT)]
    }

    /// 正在使用的间接块
    #[inline]
    pub fn indirect_blocks(&self) -> &[u32] {
        &self.indirect[..(self.indirect_count as usize).min(INDIRECT_COUNT)]
    }

    /// 计算容纳指定数据量需要多少个**数据块**
    #[inline]
    pub fn count_data_block(size: usize) -> usize {
        size.div_ceil(BLOCK_SIZE)
    }

    /// 计算容纳指定数量的数据块需要多少个**间接块**
    #[inline]
    pub fn count_indirect_block(data_blocks: usize) -> usize {
        data_blocks
            .saturating_sub(DIRECT_COUNT)
            .div_ceil(PTRS_PER_INDIRECT)
    }
}

impl Default for IndirectBlock {
    fn default() -> Self {
        Self([0; PTRS_PER_INDIRECT])
    }
}
