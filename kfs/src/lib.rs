#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* kfs 的整体架构，自上而下 */

// 接口层：挂载、打开、读写、创建删除等，全部操作串行于同一把锁
mod vfs;

// 文件描述符层：进程打开的文件
mod fd_table;
mod file;

// 路径层：从根目录逐级解析路径
mod path;

// 卷层：磁盘布局、分配器与缓存的集合
mod volume;

// 表缓存层：索引节点表、间接块表在内存中的窗口
mod table_cache;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 块缓冲：读写单个块时的中转区
mod block_buf;

mod error;

pub use block_dev::{BLOCK_SIZE, BlockDevice, BlockError};

pub use self::{
    error::{Error, Result},
    file::OpenMode,
    layout::{
        Bitmap, DIRECT_COUNT, DirEntry, DiskInode, DiskInodeKind, INDIRECT_COUNT, IndirectBlock,
        MAX_FILE_BLOCKS, NAME_MAX_LEN, PTRS_PER_INDIRECT, Perm, SuperBlock,
    },
    vfs::{DirEntryInfo, FileSystem, Stat, StatKind},
    volume::FormatOptions,
};

pub const MAGIC: u32 = 0x6b66_7331;
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;

/// 超级块所在块，0号块留给引导扇区
pub const SUPER_BLOCK_ID: usize = 1;
/// 根目录的 inode 编号
pub const ROOT_INUM: u32 = 0;
/// 打开文件表的容量
pub const MAX_OPEN_FILES: usize = 32;
