//! # 卷层
//!
//! 一个已挂载的文件系统：超级块、三张位图、两个表缓存与打开文件表。
//! 所有操作都经由 [`crate::FileSystem`] 的锁串行执行，故此处无需再加锁。

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use enumflags2::BitFlags;

use crate::block_buf::BlockBuf;
use crate::fd_table::FdTable;
use crate::layout::*;
use crate::table_cache::TableCache;
use crate::{BLOCK_SIZE, Error, MAX_OPEN_FILES, ROOT_INUM, Result, SUPER_BLOCK_ID};

/// 格式化参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// 文件系统占据块数
    pub total_blocks: u32,
    pub max_inodes: u32,
    pub max_indirect_blocks: u32,
}

impl FormatOptions {
    /// 按经验比例划分：每8块一个 inode，每64块一个间接块
    pub fn new(total_blocks: u32) -> Self {
        Self {
            total_blocks,
            max_inodes: (total_blocks / 8).max(16),
            max_indirect_blocks: total_blocks / 64,
        }
    }
}

#[derive(Debug)]
pub struct Volume {
    block_device: Arc<dyn BlockDevice>,
    super_block: SuperBlock,
    inode_bitmap: Bitmap,
    data_bitmap: Bitmap,
    indirect_bitmap: Bitmap,
    inodes: TableCache<DiskInode>,
    indirects: TableCache<IndirectBlock>,
    pub(crate) files: FdTable,
}

impl Volume {
    /// 在块设备上建立空的文件系统，只含根目录
    pub fn format(
        block_device: &Arc<dyn BlockDevice>,
        options: FormatOptions,
    ) -> Result<SuperBlock> {
        let device_blocks = block_device.num_blocks();
        let super_block = SuperBlock::new(
            options.total_blocks,
            options.max_inodes,
            options.max_indirect_blocks,
        )
        .filter(|super_block| super_block.is_valid(device_blocks))
        .ok_or_else(|| {
            log::error!("cannot lay out {options:?} on a device of {device_blocks} blocks");
            Error::MountError
        })?;
        let block_device = &**block_device;

        // 引导块保持原样；元数据区域全部清零，数据块在分配时清零
        for block_id in SUPER_BLOCK_ID..super_block.data_area_start as usize {
            BlockBuf::zeroed().store(block_device, block_id)?;
        }

        let mut buf = BlockBuf::zeroed();
        buf.map_mut(0, |sb: &mut SuperBlock| *sb = super_block);
        buf.store(block_device, SUPER_BLOCK_ID)?;

        let mut inode_bitmap = Bitmap::new(
            super_block.inode_bitmap_start as usize,
            super_block.inode_bitmap_blocks as usize,
            super_block.max_inodes as usize,
        );
        let root = inode_bitmap.alloc(block_device)?;
        debug_assert_eq!(ROOT_INUM, root);

        let mut buf = BlockBuf::zeroed();
        buf.map_mut(0, |root_inode: &mut DiskInode| {
            *root_inode = DiskInode::new(DiskInodeKind::Directory, BitFlags::all())
        });
        buf.store(block_device, super_block.inode_table_start as usize)?;

        log::info!(
            "formatted {} blocks: {} inodes, {} indirect blocks, {} data blocks",
            super_block.total_blocks,
            super_block.max_inodes,
            super_block.max_indirect_blocks,
            super_block.max_data_blocks
        );
        Ok(super_block)
    }

    /// 读入超级块与位图，按预算填充两个表缓存的窗口
    pub fn mount(
        block_device: Arc<dyn BlockDevice>,
        inode_cache_bytes: usize,
        indirect_cache_bytes: usize,
    ) -> Result<Self> {
        let mounting = |e: Error| {
            log::error!("mount failed: {e}");
            Error::MountError
        };
        let dev = &*block_device;

        let super_block = BlockBuf::load(dev, SUPER_BLOCK_ID)
            .map_err(mounting)?
            .map(0, |sb: &SuperBlock| *sb);
        if !super_block.is_valid(dev.num_blocks()) {
            log::error!("invalid super block: {super_block:?}");
            return Err(Error::MountError);
        }

        let bitmap = |start: u32, blocks: u32, capacity: u32| {
            Bitmap::load(dev, start as usize, blocks as usize, capacity as usize).map_err(mounting)
        };
        let inode_bitmap = bitmap(
            super_block.inode_bitmap_start,
            super_block.inode_bitmap_blocks,
            super_block.max_inodes,
        )?;
        let data_bitmap = bitmap(
            super_block.data_bitmap_start,
            super_block.data_bitmap_blocks,
            super_block.max_data_blocks,
        )?;
        let indirect_bitmap = bitmap(
            super_block.indirect_bitmap_start,
            super_block.indirect_bitmap_blocks,
            super_block.max_indirect_blocks,
        )?;

        // 预算向下取整后再多留一块，覆盖未满的部分
        let inode_cache_blocks = inode_cache_bytes / BLOCK_SIZE + 1;
        let mut inodes = TableCache::new(
            super_block.inode_table_start as usize,
            super_block.max_inodes as usize,
            inode_cache_blocks * super_block.inodes_per_block as usize,
        );
        inodes.preload(dev).map_err(mounting)?;

        let indirect_cache_blocks = indirect_cache_bytes / BLOCK_SIZE + 1;
        let mut indirects = TableCache::new(
            super_block.indirect_table_start as usize,
            super_block.max_indirect_blocks as usize,
            indirect_cache_blocks,
        );
        indirects.preload(dev).map_err(mounting)?;

        log::info!(
            "mounted: {} of {} inodes and {} of {} indirect blocks cached",
            inodes.capacity(),
            super_block.max_inodes,
            indirects.capacity(),
            super_block.max_indirect_blocks
        );

        Ok(Self {
            block_device,
            super_block,
            inode_bitmap,
            data_bitmap,
            indirect_bitmap,
            inodes,
            indirects,
            files: FdTable::new(MAX_OPEN_FILES),
        })
    }

    /// 写回全部脏表项与位图。出错时尽量写回其余部分，返回第一个错误。
    pub fn flush(&mut self) -> Result<()> {
        let dev = &*self.block_device;
        [
            self.inodes.flush(dev),
            self.indirects.flush(dev),
            self.inode_bitmap.sync(dev),
            self.data_bitmap.sync(dev),
            self.indirect_bitmap.sync(dev),
        ]
        .into_iter()
        .fold(Ok(()), Result::and)
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    #[inline]
    pub fn block_device(&self) -> &dyn BlockDevice {
        &*self.block_device
    }
}

/* inode 与块的分配、映射 */
impl Volume {
    /// 复制一份 inode，缺失时从磁盘读入
    #[inline]
    pub fn inode(&mut self, inum: u32) -> Result<DiskInode> {
        self.inodes.get(inum, &*self.block_device).copied()
    }

    /// 修改 inode 并标记为脏
    #[inline]
    pub fn inode_mut(&mut self, inum: u32) -> Result<&mut DiskInode> {
        self.inodes.get_mut(inum, &*self.block_device)
    }

    #[inline]
    pub fn mark_dirty(&mut self, inum: u32) {
        self.inodes.mark_dirty(inum);
    }

    /// 数据块编号对应的设备块号
    pub fn data_block_id(&self, block: u32) -> Result<usize> {
        if block < self.super_block.max_data_blocks {
            Ok(self.super_block.data_area_start as usize + block as usize)
        } else {
            log::error!("data block {block} is out of bounds");
            Err(Error::Corrupted)
        }
    }

    /// 文件内第`index`块（逻辑索引）的数据块编号：先直接索引，后间接索引
    pub fn block_of(&mut self, inode: &DiskInode, index: usize) -> Result<u32> {
        if index >= inode.blocks as usize {
            log::error!("block index {index} is beyond {} blocks", inode.blocks);
            return Err(Error::Corrupted);
        }

        if index < DIRECT_COUNT {
            return Ok(inode.direct[index]);
        }

        // 剔去直接索引的部分
        let index = index - DIRECT_COUNT;
        let indirect = *inode
            .indirect_blocks()
            .get(index / PTRS_PER_INDIRECT)
            .ok_or(Error::Corrupted)?;
        self.indirects
            .get(indirect, &*self.block_device)
            .map(|indirect_block| indirect_block.0[index % PTRS_PER_INDIRECT])
    }

    /// inode 正在使用的全部数据块，按文件内顺序排列
    pub fn block_list(&mut self, inode: &DiskInode) -> Result<Vec<u32>> {
        let total = inode.blocks as usize;
        let indirect_count = DiskInode::count_indirect_block(total);
        if inode.indirect_count as usize != indirect_count {
            log::error!(
                "inode maps {total} blocks with {} indirect blocks, expected {indirect_count}",
                inode.indirect_count
            );
            return Err(Error::Corrupted);
        }

        let mut blocks = Vec::with_capacity(total.min(MAX_FILE_BLOCKS));
        blocks.extend_from_slice(inode.direct_blocks());

        for &indirect in inode.indirect_blocks() {
            if blocks.len() >= total {
                break;
            }
            let count = (total - blocks.len()).min(PTRS_PER_INDIRECT);
            let indirect_block = self.indirects.get(indirect, &*self.block_device)?;
            blocks.extend_from_slice(&indirect_block.0[..count]);
        }

        if blocks.len() != total {
            log::error!("inode claims {total} blocks but maps {}", blocks.len());
            return Err(Error::Corrupted);
        }
        Ok(blocks)
    }

    /// 分配新的 inode 并放入缓存
    pub fn alloc_inode(&mut self, inode: DiskInode) -> Result<u32> {
        let dev = &*self.block_device;
        let inum = self.inode_bitmap.alloc(dev)?;
        if let Err(e) = self.inodes.insert(inum, inode, dev) {
            self.inode_bitmap.dealloc(dev, inum)?;
            return Err(e);
        }

        Ok(inum)
    }

    /// 在磁盘上分配新的数据块并清零，返回其编号
    pub fn alloc_data(&mut self) -> Result<u32> {
        let dev = &*self.block_device;
        let block = self.data_bitmap.alloc(dev)?;
        let zeroed = self
            .data_block_id(block)
            .and_then(|block_id| BlockBuf::zeroed().store(dev, block_id));
        if let Err(e) = zeroed {
            self.data_bitmap.dealloc(dev, block)?;
            return Err(e);
        }

        Ok(block)
    }

    /// 分配新的间接块，内容全为0
    pub fn alloc_indirect(&mut self) -> Result<u32> {
        let dev = &*self.block_device;
        let indirect = self.indirect_bitmap.alloc(dev)?;
        if let Err(e) = self.indirects.insert(indirect, IndirectBlock::default(), dev) {
            self.indirect_bitmap.dealloc(dev, indirect)?;
            return Err(e);
        }

        Ok(indirect)
    }

    /// 为 inode 追加一个数据块，必要时先追加间接块；返回新数据块的编号。
    /// 不改变文件大小。
    pub fn push_block(&mut self, inum: u32) -> Result<u32> {
        let mut inode = self.inode(inum)?;
        let index = inode.blocks as usize;
        if index >= MAX_FILE_BLOCKS {
            return Err(Error::FileTooLarge);
        }

        let block = self.alloc_data()?;
        if index < DIRECT_COUNT {
            inode.direct[index] = block;
        } else {
            let index = index - DIRECT_COUNT;
            let slot = index / PTRS_PER_INDIRECT;

            // 这次增长越过了已有间接块的容量，追加间接块
            if slot == inode.indirect_count as usize {
                match self.alloc_indirect() {
                    Ok(indirect) => {
                        inode.indirect[slot] = indirect;
                        inode.indirect_count += 1;
                    }
                    Err(e) => {
                        self.data_bitmap.dealloc(&*self.block_device, block)?;
                        return Err(e);
                    }
                }
            }

            self.indirects
                .get_mut(inode.indirect[slot], &*self.block_device)?
                .0[index % PTRS_PER_INDIRECT] = block;
        }

        inode.blocks += 1;
        *self.inode_mut(inum)? = inode;
        Ok(block)
    }

    /// 回收 inode 的全部数据块、间接块与 inode 本身
    pub fn free_inode(&mut self, inum: u32) -> Result<()> {
        let inode = self.inode(inum)?;
        let blocks = self.block_list(&inode)?;
        let dev = &*self.block_device;

        for block in blocks {
            self.data_bitmap.dealloc(dev, block)?;
        }
        for &indirect in inode.indirect_blocks() {
            self.indirect_bitmap.dealloc(dev, indirect)?;
        }

        *self.inodes.get_mut(inum, dev)? = DiskInode::default();
        self.inode_bitmap.dealloc(dev, inum)
    }
}
