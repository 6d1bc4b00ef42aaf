#![no_std]

extern crate alloc;

/* sysv-fs 的整体架构，自上而下 */

// 索引节点层：vnode 及其上的目录操作、文件读写与页桥接回调
mod dir;
mod file;
mod vnode;

// 磁盘块管理器层：挂载卸载、空闲链表分配器、一致性检查
mod fs;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 页缓存层：内存上的磁盘页数据缓存
mod page_cache;

pub use self::{
    fs::SysvFileSystem,
    layout::{DirEntry, DiskInode, InodeKind, NAME_LEN, SuperBlock},
    vnode::Vnode,
};

pub const MAGIC: u32 = 0x5356_0001;
pub const VERSION: u32 = 1;
/// 块大小与页大小一致
pub const BLOCK_SIZE: usize = 4096;
/// 空闲 inode 链表的空哨兵
pub const NILINO: u32 = u32::MAX;

type DataBlock = [u8; BLOCK_SIZE];
