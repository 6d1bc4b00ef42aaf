use core::{ptr, slice};

use crate::BLOCK_SIZE;

/// 直接索引槽数量，凑齐 128 字节记录
pub const NDIRECT: usize = 27;
/// 一级间接索引块的索引容量
pub const INDIRECT_COUNT: usize = BLOCK_SIZE / size_of::<u32>();
/// 单文件最大块数
pub const BLOCK_CAP: usize = NDIRECT + INDIRECT_COUNT;

/// 一级间接索引块
pub type IndirectBlock = [u32; INDIRECT_COUNT];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum InodeKind {
    /// 空闲记录，可被重新分配
    #[default]
    Free = 0,
    File,
    Directory,
    CharDev,
    BlockDev,
}

/// 磁盘 inode 记录，在 inode 表中按 编号 × 记录大小 寻址
#[derive(Debug, Default)]
#[repr(C)]
pub struct DiskInode {
    pub kind: InodeKind,
    /// 硬链接数；按约定，驻留中的 vnode 本身也计为一条链接
    pub links: u32,
    // 不用 usize 是为了严控布局
    pub size: u32,
    /// 字符/块设备文件的设备号
    pub devid: u32,
    /// 直接索引槽，0 表示空洞
    pub direct: [u32; NDIRECT],
    /// 一级间接索引块的块号；记录空闲时复用为下一空闲 inode 编号
    pub indirect: u32,
}

impl DiskInode {
    /// 记录大小恒为 128 字节
    pub const SIZE: usize = 128;

    pub fn init(&mut self, kind: InodeKind, devid: u32) {
        *self = Self {
            kind,
            devid,
            ..Self::default()
        };
    }

    pub fn is_free(&self) -> bool {
        self.kind == InodeKind::Free
    }

    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory
    }

    /// 释放记录，将下一空闲 inode 编号存进 indirect 槽
    pub fn set_free(&mut self, next_free: u32) {
        self.init(InodeKind::Free, 0);
        self.indirect = next_free;
    }

    /// 仅对空闲记录有意义
    pub fn next_free(&self) -> u32 {
        self.indirect
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }
}
