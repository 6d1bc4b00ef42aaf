//! # 索引节点层
//!
//! 每个活跃 inode 对应一个驻留内存的 [`Vnode`]，钉住自己的
//! inode 表页并携带一把操作互斥锁。目录操作见 `dir`，
//! 文件读写与页桥接回调见 `file`。

use alloc::sync::Arc;

use spin::{Mutex, MutexGuard};
use vfs::{DirEntryType, Result, Stat};

use crate::BLOCK_SIZE;
use crate::fs::SysvFileSystem;
use crate::layout::{DiskInode, InodeKind};
use crate::page_cache::Page;

pub struct Vnode {
    ino: u32,
    kind: InodeKind,
    devid: u32,
    /// inode 记录所在页，驻留期间保持钉住
    page: Arc<Mutex<Page>>,
    /// 记录的页内偏移
    offset: usize,
    /// vnode 操作互斥锁：读写本 inode 状态或目录内容的操作全程持有
    pub(crate) lock: Mutex<()>,
}

impl Vnode {
    pub(crate) fn new(
        ino: u32,
        kind: InodeKind,
        devid: u32,
        page: Arc<Mutex<Page>>,
        offset: usize,
    ) -> Self {
        Self {
            ino,
            kind,
            devid,
            page,
            offset,
            lock: Mutex::new(()),
        }
    }

    pub fn ino(&self) -> u32 {
        self.ino
    }

    /// 字符/块设备文件的设备号
    pub fn devid(&self) -> u32 {
        self.devid
    }

    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory
    }

    /// 读取磁盘上的 inode 记录
    pub(crate) fn meta<V>(&self, f: impl FnOnce(&DiskInode) -> V) -> V {
        self.page.lock().map(self.offset, f)
    }

    /// 修改磁盘上的 inode 记录，页随之标脏
    pub(crate) fn meta_mut<V>(&self, f: impl FnOnce(&mut DiskInode) -> V) -> V {
        self.page.lock().map_mut(self.offset, f)
    }

    pub fn size(&self) -> u32 {
        self.meta(|record| record.size)
    }

    pub fn links(&self) -> u32 {
        self.meta(|record| record.links)
    }

    pub fn stat(&self, fs: &SysvFileSystem) -> Result<Stat> {
        let _guard = self.lock.lock();
        let (links, size) = self.meta(|record| (record.links, record.size));
        Ok(Stat {
            mode: self.kind.into(),
            ino: self.ino as u64,
            links,
            size: size as u64,
            block_size: BLOCK_SIZE as u64,
            blocks: self.count_blocks(fs)? as u64,
        })
    }

    /// 两个 vnode 的锁按 inode 编号升序获取，避免交叉死锁
    pub(crate) fn lock_pair<'a>(
        a: &'a Vnode,
        b: &'a Vnode,
    ) -> (MutexGuard<'a, ()>, Option<MutexGuard<'a, ()>>) {
        if a.ino == b.ino {
            (a.lock.lock(), None)
        } else if a.ino < b.ino {
            let first = a.lock.lock();
            (first, Some(b.lock.lock()))
        } else {
            let second = b.lock.lock();
            (a.lock.lock(), Some(second))
        }
    }
}

impl From<InodeKind> for DirEntryType {
    fn from(kind: InodeKind) -> Self {
        match kind {
            InodeKind::Directory => Self::Directory,
            InodeKind::CharDev => Self::Char,
            InodeKind::BlockDev => Self::Block,
            InodeKind::File | InodeKind::Free => Self::Regular,
        }
    }
}
