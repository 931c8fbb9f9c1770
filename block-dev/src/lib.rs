//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、SD卡等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 读写均为同步操作，驱动自身负责超时与重试，
//! 失败时以 [`BlockError`] 告知上层。

#![no_std]

use core::fmt::{self, Debug, Display};

/// 块大小（字节）
pub const BLOCK_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// 块号超出设备容量
    OutOfRange,
    /// 缓冲区长度不等于 [`BLOCK_SIZE`]
    BadBuffer,
    /// 设备本身报告的错误
    Device,
}

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Debug {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), BlockError>;

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), BlockError>;

    /// 设备的总块数
    fn num_blocks(&self) -> usize;
}

impl Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange => f.write_str("block id out of range"),
            Self::BadBuffer => f.write_str("buffer is not one block long"),
            Self::Device => f.write_str("device error"),
        }
    }
}

impl core::error::Error for BlockError {}
