use crate::DirEntryType;

#[derive(Debug)]
#[repr(C, align(32))]
pub struct Stat {
    pub mode: DirEntryType,
    /// Inode number
    pub ino: u64,
    /// Hard link count
    pub links: u32,
    /// File size
    pub size: u64,
    /// Optimal I/O block size
    pub block_size: u64,
    /// Occupying blocks
    pub blocks: u64,
}
