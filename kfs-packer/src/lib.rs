#[cfg(test)]
mod tests;

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use block_dev::{BLOCK_SIZE, BlockDevice, BlockError};
use enumflags2::BitFlags;
use kfs::{FileSystem, OpenMode};

/// 以宿主机上的文件作为块设备
#[derive(Debug)]
pub struct BlockFile(pub Mutex<File>);

impl BlockFile {
    /// 创建（或截断）镜像文件并设定长度
    pub fn create(path: &Path, blocks: usize) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((blocks * BLOCK_SIZE) as u64)?;

        Ok(Self(Mutex::new(file)))
    }

    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        Ok(Self(Mutex::new(file)))
    }

    fn seek_block(file: &mut File, block_id: usize) -> Result<(), BlockError> {
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .map(drop)
            .map_err(|_| BlockError::Device)
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), BlockError> {
        if buf.len() != BLOCK_SIZE {
            return Err(BlockError::BadBuffer);
        }
        if block_id >= self.num_blocks() {
            return Err(BlockError::OutOfRange);
        }

        let mut file = self.0.lock().map_err(|_| BlockError::Device)?;
        Self::seek_block(&mut file, block_id)?;
        file.read_exact(buf).map_err(|_| BlockError::Device)
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), BlockError> {
        if buf.len() != BLOCK_SIZE {
            return Err(BlockError::BadBuffer);
        }
        if block_id >= self.num_blocks() {
            return Err(BlockError::OutOfRange);
        }

        let mut file = self.0.lock().map_err(|_| BlockError::Device)?;
        Self::seek_block(&mut file, block_id)?;
        file.write_all(buf).map_err(|_| BlockError::Device)
    }

    fn num_blocks(&self) -> usize {
        self.0
            .lock()
            .ok()
            .and_then(|file| file.metadata().ok())
            .map_or(0, |metadata| metadata.len() as usize / BLOCK_SIZE)
    }
}

/// 将宿主机目录`source`递归复制到镜像中的目录`target`下，返回复制的文件数
pub fn pack(file_system: &FileSystem, source: &Path, target: &str) -> io::Result<usize> {
    let mut packed = 0;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            log::warn!("skipping non-UTF-8 name {name:?}");
            continue;
        };
        let path = format!("{}/{name}", target.trim_end_matches('/'));

        if entry.file_type()?.is_dir() {
            file_system.mkdir(&path).map_err(io::Error::other)?;
            packed += pack(file_system, &entry.path(), &path)?;
            continue;
        }

        let mut data = Vec::new();
        File::open(entry.path())?.read_to_end(&mut data)?;
        file_system
            .create(&path, BitFlags::all())
            .map_err(io::Error::other)?;

        let fd = file_system.open(&path, OpenMode::Write).map_err(io::Error::other)?;
        let written = file_system.write(fd, &data).map_err(io::Error::other);
        file_system.close(fd).map_err(io::Error::other)?;
        log::info!("packed {path}: {} bytes", written?);
        packed += 1;
    }

    Ok(packed)
}
