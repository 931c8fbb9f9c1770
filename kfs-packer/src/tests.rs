use std::path::PathBuf;
use std::sync::Arc;

use kfs::{FileSystem, FormatOptions, OpenMode, StatKind};

use super::*;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("kfs-packer-{}-{name}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn block_file_roundtrip() {
    let dir = scratch_dir("roundtrip");
    let block_file = BlockFile::create(&dir.join("fs.img"), 8).unwrap();
    assert_eq!(8, block_file.num_blocks());

    let block = [0x5a; BLOCK_SIZE];
    block_file.write_block(3, &block).unwrap();
    let mut buf = [0; BLOCK_SIZE];
    block_file.read_block(3, &mut buf).unwrap();
    assert_eq!(block, buf);

    assert_eq!(Err(BlockError::OutOfRange), block_file.read_block(8, &mut buf));
    assert_eq!(Err(BlockError::BadBuffer), block_file.write_block(0, &block[..8]));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn pack_directory() {
    let dir = scratch_dir("pack");
    let source = dir.join("apps");
    fs::create_dir_all(source.join("bin")).unwrap();
    fs::write(source.join("hello"), b"hello, world").unwrap();
    let elf: Vec<u8> = (0..30 * BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
    fs::write(source.join("bin").join("init"), &elf).unwrap();

    let image = dir.join("fs.img");
    let block_file: Arc<dyn BlockDevice> = Arc::new(BlockFile::create(&image, 1024).unwrap());
    FileSystem::format(&block_file, FormatOptions::new(1024)).unwrap();
    let fs = FileSystem::new();
    fs.mount(block_file, 0, 0).unwrap();
    assert_eq!(2, pack(&fs, &source, "/").unwrap());
    fs.unmount().unwrap();

    // 重新打开镜像检查内容
    let block_file: Arc<dyn BlockDevice> = Arc::new(BlockFile::open(&image).unwrap());
    fs.mount(block_file, 4096, 4096).unwrap();
    assert_eq!(StatKind::DIR, fs.stat("/bin").unwrap().kind);

    let fd = fs.open("/bin/init", OpenMode::Read).unwrap();
    let mut buf = vec![0; elf.len() + 100];
    assert_eq!(elf.len(), fs.read(fd, &mut buf).unwrap());
    assert_eq!(elf, buf[..elf.len()]);

    let fd = fs.open("/hello", OpenMode::Read).unwrap();
    let mut buf = [0; 32];
    let len = fs.read(fd, &mut buf).unwrap();
    assert_eq!(b"hello, world", &buf[..len]);
    fs.unmount().unwrap();

    fs::remove_dir_all(&dir).unwrap();
}
