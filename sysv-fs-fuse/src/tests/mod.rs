use std::sync::{Arc, Mutex};

use block_dev::{BlockDevice, DevError};
use sysv_fs::{BLOCK_SIZE, DiskInode, SysvFileSystem};
use vfs::Error;

mod dir;

/// 内存块设备，省去测试临时文件
pub struct MemDisk(Mutex<Vec<u8>>);

impl MemDisk {
    pub fn new(blocks: u32) -> Arc<Self> {
        Arc::new(Self(Mutex::new(vec![0; blocks as usize * BLOCK_SIZE])))
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DevError> {
        let data = self.0.lock().unwrap();
        let start = block_id * BLOCK_SIZE;
        let Some(block) = data.get(start..start + BLOCK_SIZE) else {
            return Err(DevError::OutOfRange);
        };
        buf.copy_from_slice(block);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DevError> {
        let mut data = self.0.lock().unwrap();
        let start = block_id * BLOCK_SIZE;
        let Some(block) = data.get_mut(start..start + BLOCK_SIZE) else {
            return Err(DevError::OutOfRange);
        };
        block.copy_from_slice(buf);
        Ok(())
    }
}

pub fn fresh(blocks: u32, inodes: u32) -> (Arc<MemDisk>, Arc<SysvFileSystem>) {
    let disk = MemDisk::new(blocks);
    let device: Arc<dyn BlockDevice> = disk.clone();
    let volume = SysvFileSystem::format(device, blocks, inodes).unwrap();
    (disk, volume)
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn mount_rejects_blank_device() {
    let disk = MemDisk::new(16);
    assert_eq!(SysvFileSystem::mount(disk).err(), Some(Error::Corrupted));
}

#[test]
fn persists_across_remount() {
    let (disk, volume) = fresh(64, 32);
    let root = volume.root();
    let data = pattern(5000);

    let inode = root.create("hello", &volume).unwrap();
    inode.write_at(0, &data, &volume).unwrap();
    volume.vput(inode).unwrap();
    drop(root);
    volume.unmount().unwrap();

    let volume = SysvFileSystem::mount(disk).unwrap();
    let root = volume.root();
    let inode = root.lookup("hello", &volume).unwrap();
    let mut buf = vec![0; data.len()];
    assert_eq!(inode.read_at(0, &mut buf, &volume).unwrap(), data.len());
    assert_eq!(buf, data);
    volume.vput(inode).unwrap();
    drop(root);
    volume.unmount().unwrap();
}

#[test]
fn end_to_end_lifecycle() {
    let (_disk, volume) = fresh(512, 100);
    let root = volume.root();

    let a = root.create("a", &volume).unwrap();
    // 持有中：一条目录项加我们这份引用
    assert_eq!(a.links(), 2);
    assert!(volume.is_referenced(&a));

    let data = pattern(10_000);
    assert_eq!(a.write_at(0, &data, &volume).unwrap(), data.len());
    let stat = a.stat(&volume).unwrap();
    assert_eq!(stat.size, 10_000);
    assert_eq!(stat.blocks, 3);
    volume.vput(a).unwrap();

    // 归还后只剩目录项那条链接
    let a = root.lookup("a", &volume).unwrap();
    assert_eq!(a.links(), 2);
    volume.vput(a).unwrap();

    root.unlink("a", &volume).unwrap();
    assert_eq!(root.lookup("a", &volume).err(), Some(Error::NotFound));

    drop(root);
    volume.unmount().unwrap();
}

#[test]
fn unmount_flags_corrupt_link_count() {
    let (disk, volume) = fresh(64, 32);
    let root = volume.root();
    let f = root.create("a", &volume).unwrap();
    volume.vput(f).unwrap();
    drop(root);
    volume.unmount().unwrap();

    // inode 表在块 1；1 号记录的链接数紧跟类型字段
    let mut block = vec![0; BLOCK_SIZE];
    disk.read_block(1, &mut block).unwrap();
    block[DiskInode::SIZE + 4..DiskInode::SIZE + 8].copy_from_slice(&5u32.to_le_bytes());
    disk.write_block(1, &block).unwrap();

    let volume = SysvFileSystem::mount(disk).unwrap();
    assert_eq!(volume.unmount().unwrap_err(), Error::Fatal);
}

#[test]
fn unmount_flags_leaked_vnode() {
    let (_disk, volume) = fresh(64, 32);
    let root = volume.root();
    let _held = root.create("x", &volume).unwrap();
    drop(root);
    assert_eq!(volume.unmount().unwrap_err(), Error::Fatal);
}
