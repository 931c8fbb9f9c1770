//! # 磁盘数据结构层
//!
//! kfs 的磁盘布局：
//! 引导块 | 超级块 | 索引节点位图 | 数据块位图 | 间接块位图 | 索引节点表 | 间接块表 | 数据块区域

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{
    DIRECT_COUNT, DiskInode, DiskInodeKind, INDIRECT_COUNT, IndirectBlock, MAX_FILE_BLOCKS,
    PTRS_PER_INDIRECT, Perm,
};

/// 文件项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{DirBlock, DirEntry, NAME_MAX_LEN};
