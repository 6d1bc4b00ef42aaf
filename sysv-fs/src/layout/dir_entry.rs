use core::{ptr, slice};

use vfs::Error;

/// 目录名最大长度
pub const NAME_LEN: usize = 27;

/// 目录文件的内容是定长目录项的平铺序列。
/// 名字全零的目录项是墓碑：删除就地抹除，槽位留待复用，从不压缩。
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct DirEntry {
    // 最后一字节留给 \0
    name: [u8; NAME_LEN + 1],
    ino: u32,
}

impl DirEntry {
    /// 目录项大小恒为 32 字节
    pub const SIZE: usize = 32;

    /// 调用者保证 name 长度不超过 [`NAME_LEN`]
    pub fn new(name: &str, ino: u32) -> Self {
        let mut bytes = [0; NAME_LEN + 1];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Self { name: bytes, ino }
    }

    /// 墓碑目录项
    pub fn tombstone() -> Self {
        Self::default()
    }

    /// 损坏的镜像里名字可能没有 \0 也可能不是 UTF-8，
    /// 不能让一条坏目录项把宿主进程带崩
    pub fn name(&self) -> Result<&str, Error> {
        let len = self
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).map_err(|_| Error::Corrupted)
    }

    pub fn ino(&self) -> u32 {
        self.ino
    }

    pub fn is_empty(&self) -> bool {
        self.name[0] == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), Self::SIZE) }
    }
}
