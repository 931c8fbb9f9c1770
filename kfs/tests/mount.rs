mod common;

use std::sync::Arc;

use common::{RamDisk, format, fresh, init_logger, mount, pattern};
use enumflags2::BitFlags;
use kfs::{
    BLOCK_SIZE, BlockDevice, DIRECT_COUNT, Error, FileSystem, FormatOptions, OpenMode, StatKind,
};

const NAMES: [&str; 8] = ["/a", "/b", "/c", "/d", "/e", "/f", "/g", "/h"];

fn read_all(fs: &FileSystem, path: &str) -> Vec<u8> {
    let fd = fs.open(path, OpenMode::Read).unwrap();
    let mut buf = vec![0; fs.fstat(fd).unwrap().size as usize];
    assert_eq!(Ok(buf.len()), fs.read(fd, &mut buf));
    fs.close(fd).unwrap();
    buf
}

#[test]
fn remount_keeps_contents() {
    let (disk, fs) = fresh();
    fs.mkdir("/etc").unwrap();
    fs.create("/etc/motd", BitFlags::all()).unwrap();
    let data = pattern(3 * BLOCK_SIZE + 100, 7);
    let fd = fs.open("/etc/motd", OpenMode::Write).unwrap();
    fs.write(fd, &data).unwrap();
    fs.unmount().unwrap();

    let fs = mount(&disk, 0, 0);
    assert_eq!(data, read_all(&fs, "/etc/motd"));
    let entries = fs.read_dir("/etc").unwrap();
    assert_eq!(1, entries.len());
    assert_eq!("motd", entries[0].name);
    assert_eq!(StatKind::FILE, entries[0].kind);
}

#[test]
fn evicted_inode_is_written_back() {
    let (disk, fs) = fresh();
    for name in NAMES {
        fs.create(name, BitFlags::all()).unwrap();
    }
    fs.unmount().unwrap();

    // 零预算只留一块，即4个 inode
    fs.mount(disk.clone(), 0, 0).unwrap();
    let fd = fs.open("/a", OpenMode::Write).unwrap();
    fs.write(fd, b"persisted").unwrap();
    for _ in 0..2 {
        for name in &NAMES[1..] {
            assert_eq!(0, fs.stat(name).unwrap().size);
        }
    }

    // 不卸载，另一次挂载直接从磁盘读取
    let other = mount(&disk, 0, 0);
    assert_eq!(9, other.stat("/a").unwrap().size);
    assert_eq!(b"persisted".to_vec(), read_all(&other, "/a"));
}

#[test]
fn sync_without_unmount() {
    let (disk, fs) = fresh();
    fs.create("/f", BitFlags::all()).unwrap();
    let fd = fs.open("/f", OpenMode::Write).unwrap();
    fs.write(fd, &[3; DIRECT_COUNT * BLOCK_SIZE + 1]).unwrap();

    fs.sync().unwrap();
    let other = mount(&disk, 0, 0);
    let stat = other.stat("/f").unwrap();
    assert_eq!(DIRECT_COUNT as u32 + 1, stat.blocks);
    assert!(read_all(&other, "/f").iter().all(|&byte| byte == 3));
}

#[test]
fn device_errors_surface() {
    let (disk, fs) = fresh();
    fs.create("/f", BitFlags::all()).unwrap();
    let fd = fs.open("/f", OpenMode::Write).unwrap();

    disk.set_failing(true);
    assert_eq!(Err(Error::IoError), fs.write(fd, b"data"));
    assert_eq!(Err(Error::IoError), fs.stat("/f").map(|stat| stat.size));

    // 写回失败时保持挂载
    assert_eq!(Err(Error::IoError), fs.unmount());
    assert!(fs.is_mounted());

    disk.set_failing(false);
    fs.unmount().unwrap();
    assert!(!fs.is_mounted());

    let fs = mount(&disk, 0, 0);
    assert_eq!(0, fs.stat("/f").unwrap().size);
}

#[test]
fn read_error_keeps_completed_pieces() {
    let (disk, fs) = fresh();
    fs.create("/f", BitFlags::all()).unwrap();
    let data = pattern(4 * BLOCK_SIZE, 9);
    let fd = fs.open("/f", OpenMode::ReadWrite).unwrap();
    fs.write(fd, &data).unwrap();
    fs.seek(fd, -(4 * BLOCK_SIZE as isize)).unwrap();

    disk.set_failing(true);
    let mut buf = vec![0; 4 * BLOCK_SIZE];
    assert_eq!(Err(Error::IoError), fs.read(fd, &mut buf));
    disk.set_failing(false);
    assert_eq!(Ok(0), fs.seek(fd, 0));

    // inode 已在缓存中，每块只读一次设备：前两块读完后失败
    disk.fail_after(2);
    assert_eq!(Err(Error::IoError), fs.read(fd, &mut buf));
    disk.set_failing(false);
    assert_eq!(Ok(2 * BLOCK_SIZE), fs.seek(fd, 0));
    assert!(data[..2 * BLOCK_SIZE] == buf[..2 * BLOCK_SIZE]);

    assert_eq!(Ok(2 * BLOCK_SIZE), fs.read(fd, &mut buf));
    assert!(data[2 * BLOCK_SIZE..] == buf[..2 * BLOCK_SIZE]);
}

#[test]
fn write_error_keeps_completed_pieces() {
    let (disk, fs) = fresh();
    fs.create("/f", BitFlags::all()).unwrap();
    let fd = fs.open("/f", OpenMode::Write).unwrap();

    // 每分配一块写两次（位图块与清零），共4块；随后整块写入只写一次
    disk.fail_after(4 * 2 + 2);
    assert_eq!(Err(Error::IoError), fs.write(fd, &[7; 4 * BLOCK_SIZE]));
    disk.set_failing(false);

    assert_eq!(Ok(2 * BLOCK_SIZE), fs.seek(fd, 0));
    let stat = fs.fstat(fd).unwrap();
    assert_eq!(2 * BLOCK_SIZE as u32, stat.size);
    assert_eq!(4, stat.blocks);
    assert_eq!(vec![7; 2 * BLOCK_SIZE], read_all(&fs, "/f"));
}

#[test]
fn mount_errors() {
    init_logger();
    let blank = RamDisk::new(64);
    let fs = FileSystem::new();
    assert_eq!(Err(Error::MountError), fs.mount(blank.clone(), 0, 0));
    assert!(!fs.is_mounted());

    let dev: Arc<dyn BlockDevice> = blank.clone();
    assert_eq!(
        Err(Error::MountError),
        FileSystem::format(&dev, FormatOptions::new(4096)).map(drop)
    );

    format(&blank, FormatOptions::new(64));
    blank.set_failing(true);
    assert_eq!(Err(Error::MountError), fs.mount(blank.clone(), 0, 0));

    blank.set_failing(false);
    fs.mount(blank.clone(), 0, 0).unwrap();
    assert_eq!(Err(Error::MountError), fs.mount(blank.clone(), 0, 0));
}

#[test]
fn unmounted_calls() {
    let (_disk, fs) = fresh();
    fs.unmount().unwrap();
    fs.unmount().unwrap();

    assert_eq!(Err(Error::NotMounted), fs.open("/", OpenMode::Read));
    assert_eq!(Err(Error::NotMounted), fs.create("/f", BitFlags::all()));
    assert_eq!(Err(Error::NotMounted), fs.close(0));
    assert_eq!(Err(Error::NotMounted), fs.sync());
}

#[test]
fn data_exhaustion() {
    init_logger();
    let disk = RamDisk::new(64);
    format(
        &disk,
        FormatOptions {
            total_blocks: 64,
            max_inodes: 16,
            max_indirect_blocks: 0,
        },
    );
    let fs = mount(&disk, 0, 0);
    fs.create("/f", BitFlags::all()).unwrap();
    let fd = fs.open("/f", OpenMode::Write).unwrap();

    let full = [1; DIRECT_COUNT * BLOCK_SIZE];
    assert_eq!(Ok(full.len()), fs.write(fd, &full));
    assert_eq!(Err(Error::OutOfResources), fs.write(fd, b"x"));
    assert_eq!((DIRECT_COUNT * BLOCK_SIZE) as u32, fs.fstat(fd).unwrap().size);
}

#[test]
fn format_writes_only_metadata() {
    init_logger();
    let disk = RamDisk::new(1024);
    let boot = [0xeb; BLOCK_SIZE];
    disk.write_block(0, &boot).unwrap();
    let dev: Arc<dyn BlockDevice> = disk.clone();
    let super_block = FileSystem::format(&dev, FormatOptions::new(1024)).unwrap();

    // 引导块原样保留
    let mut buf = [0; BLOCK_SIZE];
    disk.read_block(0, &mut buf).unwrap();
    assert_eq!(boot, buf);

    assert!(super_block.is_valid(1024));
    assert_eq!(128, super_block.max_inodes);
    assert!(disk.writes() < super_block.data_area_start as usize + 4);

    let fs = mount(&disk, 0, 0);
    assert_eq!(StatKind::DIR, fs.stat("/").unwrap().kind);
    assert!(fs.read_dir("/").unwrap().is_empty());
}

#[test]
fn inconsistent_indirect_count_is_corrupted() {
    let (disk, fs) = fresh();
    let inum = fs.mkdir("/etc").unwrap();
    fs.create("/etc/motd", BitFlags::all()).unwrap();
    let super_block = fs.super_block().unwrap();
    fs.unmount().unwrap();

    // 目录只有一个数据块，却声称占用了一个间接块
    let inodes_per_block = super_block.inodes_per_block;
    let block_id = (super_block.inode_table_start + inum / inodes_per_block) as usize;
    let offset = (inum % inodes_per_block) as usize * 128 + 20;
    let mut buf = [0; BLOCK_SIZE];
    disk.read_block(block_id, &mut buf).unwrap();
    assert_eq!(0u32.to_ne_bytes(), buf[offset..offset + 4]);
    buf[offset..offset + 4].copy_from_slice(&1u32.to_ne_bytes());
    disk.write_block(block_id, &buf).unwrap();

    let fs = mount(&disk, 0, 0);
    assert_eq!(StatKind::DIR, fs.stat("/etc").unwrap().kind);
    assert_eq!(Err(Error::Corrupted), fs.resolve("/etc/motd"));
    assert_eq!(Err(Error::Corrupted), fs.read_dir("/etc"));
}
