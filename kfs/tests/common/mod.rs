#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use kfs::{BLOCK_SIZE, BlockDevice, BlockError, FileSystem, FormatOptions};

/// 内存中的块设备，可随时切换为全部失败
#[derive(Debug)]
pub struct RamDisk {
    blocks: Mutex<Vec<[u8; BLOCK_SIZE]>>,
    failing: AtomicBool,
    /// 还允许成功的读写次数，用尽后全部失败
    budget: Mutex<Option<usize>>,
    writes: AtomicUsize,
}

impl RamDisk {
    pub fn new(blocks: usize) -> Arc<Self> {
        Arc::new(Self {
            blocks: Mutex::new(vec![[0; BLOCK_SIZE]; blocks]),
            failing: AtomicBool::new(false),
            budget: Mutex::new(None),
            writes: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
        *self.budget.lock().unwrap() = None;
    }

    /// 再成功`ops`次读写后开始失败
    pub fn fail_after(&self, ops: usize) {
        *self.budget.lock().unwrap() = Some(ops);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self, block_id: usize, len: usize) -> Result<(), BlockError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BlockError::Device);
        }
        if let Some(ops) = self.budget.lock().unwrap().as_mut() {
            if *ops == 0 {
                return Err(BlockError::Device);
            }
            *ops -= 1;
        }

        if len != BLOCK_SIZE {
            Err(BlockError::BadBuffer)
        } else if block_id >= self.num_blocks() {
            Err(BlockError::OutOfRange)
        } else {
            Ok(())
        }
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), BlockError> {
        self.check(block_id, buf.len())?;
        buf.copy_from_slice(&self.blocks.lock().unwrap()[block_id]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), BlockError> {
        self.check(block_id, buf.len())?;
        self.blocks.lock().unwrap()[block_id].copy_from_slice(buf);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn num_blocks(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn format(disk: &Arc<RamDisk>, options: FormatOptions) {
    let dev: Arc<dyn BlockDevice> = disk.clone();
    FileSystem::format(&dev, options).unwrap();
}

pub fn mount(
    disk: &Arc<RamDisk>,
    inode_cache_bytes: usize,
    indirect_cache_bytes: usize,
) -> FileSystem {
    let fs = FileSystem::new();
    fs.mount(disk.clone(), inode_cache_bytes, indirect_cache_bytes)
        .unwrap();
    fs
}

/// 格式化一块1024块的盘并以宽裕的缓存挂载
pub fn fresh() -> (Arc<RamDisk>, FileSystem) {
    init_logger();
    let disk = RamDisk::new(1024);
    format(&disk, FormatOptions::new(1024));
    let fs = mount(&disk, 8 * BLOCK_SIZE, 4 * BLOCK_SIZE);
    (disk, fs)
}

/// 可辨认的字节序列
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 ^ seed).collect()
}
