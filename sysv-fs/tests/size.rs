use std::mem;

use sysv_fs::{BLOCK_SIZE, DirEntry, DiskInode, SuperBlock};

#[test]
fn layout() {
    assert_eq!(DiskInode::SIZE, mem::size_of::<DiskInode>());
    assert_eq!(DirEntry::SIZE, mem::size_of::<DirEntry>());
    assert!(mem::size_of::<SuperBlock>() <= BLOCK_SIZE);
    assert_eq!(0, BLOCK_SIZE % DiskInode::SIZE);
    assert_eq!(0, BLOCK_SIZE % DirEntry::SIZE);
}
