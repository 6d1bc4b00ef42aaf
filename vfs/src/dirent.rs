use alloc::string::String;

#[derive(Debug)]
pub struct DirEntry {
    /// Inode number
    pub inode: u64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DirEntryType {
    Block,
    Char,
    Directory,
    #[default]
    Regular,
}
