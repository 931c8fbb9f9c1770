use crate::BLOCK_SIZE;

/// 名字的最大长度，名字段的最后一字节留给 \0
pub const NAME_MAX_LEN: usize = 27;
/// 每个目录数据块可容纳的目录项数
pub const DIR_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DirEntry::SIZE;

/// 目录数据块
pub type DirBlock = [DirEntry; DIR_ENTRIES_PER_BLOCK];

/// 文件系统项的元信息
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct DirEntry {
    name: [u8; NAME_MAX_LEN + 1],
    inum: u32,
}

impl DirEntry {
    /// 元信息大小恒为32字节
    pub const SIZE: usize = 32;

    /// 已删除目录项的 inode 编号
    pub const TOMBSTONE: u32 = u32::MAX;

    /// 名字须事先经过检查：非空、不超长、不含 \0
    #[inline]
    pub fn new(name: &str, inum: u32) -> Self {
        let bytes = name.as_bytes();
        assert!(!bytes.is_empty() && bytes.len() <= NAME_MAX_LEN && !bytes.contains(&0));
        let mut name = [0; NAME_MAX_LEN + 1];
        name[..bytes.len()].copy_from_slice(bytes);

        Self { name, inum }
    }

    /// 已删除的目录项：名字全为0，编号为墓碑
    #[inline]
    pub fn removed() -> Self {
        Self {
            name: [0; NAME_MAX_LEN + 1],
            inum: Self::TOMBSTONE,
        }
    }

    /// 名字为空的目录项未被使用
    #[inline]
    pub fn is_free(&self) -> bool {
        self.name[0] == 0 || self.inum == Self::TOMBSTONE
    }

    /// 名字的有效部分，不含结尾的 \0
    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(self.name.len());
        &self.name[..len]
    }

    /// 在名字段的宽度内逐字节比较
    #[inline]
    pub fn matches(&self, name: &str) -> bool {
        !self.is_free() && self.name_bytes() == name.as_bytes()
    }

    #[inline]
    pub fn inum(&self) -> u32 {
        self.inum
    }
}

#[cfg(test)]
mod tests {
    use core::mem;

    use super::*;

    #[test]
    fn size() {
        assert_eq!(DirEntry::SIZE, mem::size_of::<DirEntry>());
        assert_eq!(16, DIR_ENTRIES_PER_BLOCK);
    }

    #[test]
    fn name_compare() {
        let entry = DirEntry::new("kernel.elf", 7);
        assert!(entry.matches("kernel.elf"));
        assert!(!entry.matches("kernel"));
        assert!(!entry.matches("kernel.elf2"));
        assert_eq!(7, entry.inum());

        let longest = "a".repeat(NAME_MAX_LEN);
        assert!(DirEntry::new(&longest, 1).matches(&longest));
    }

    #[test]
    fn free_entries() {
        assert!(DirEntry::default().is_free());
        assert!(DirEntry::removed().is_free());
        assert!(!DirEntry::removed().matches(""));
        assert!(!DirEntry::new("x", 0).is_free());
    }
}
