//! # 磁盘数据结构层
//!
//! sysv-fs 的磁盘布局：
//! 超级块 | inode 表 | 数据块区域
//!
//! 空闲 inode 与空闲数据块各自串成一条索引链表，
//! 表头持久化在超级块里，空闲记录自身存放下一空闲项的索引。

mod super_block;
pub use super_block::SuperBlock;

mod inode;
pub use inode::{BLOCK_CAP, DiskInode, IndirectBlock, InodeKind, NDIRECT};

/// 目录项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{DirEntry, NAME_LEN};
