use core::{ptr, slice};

use vfs::Error;

use crate::{MAGIC, NILINO, VERSION};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 持久化两条空闲链表的表头与根目录位置
#[derive(Debug)]
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    version: u32,
    /// inode 总数
    pub num_inodes: u32,
    /// 空闲 inode 链表头，[`NILINO`] 表示链表为空
    pub free_inode: u32,
    /// 空闲数据块链表头，0 表示链表为空
    pub free_block: u32,
    /// 根目录的 inode 编号
    pub root_inode: u32,
    /// 文件系统占据块数
    pub total_blocks: u32,
}

impl SuperBlock {
    pub fn new(
        num_inodes: u32,
        free_inode: u32,
        free_block: u32,
        root_inode: u32,
        total_blocks: u32,
    ) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            num_inodes,
            free_inode,
            free_block,
            root_inode,
            total_blocks,
        }
    }

    /// 校验魔数、版本与各字段的边界
    pub fn check(&self) -> Result<(), Error> {
        if self.magic != MAGIC {
            log::error!("bad magic {:#x}", self.magic);
            return Err(Error::Corrupted);
        }
        if self.version != VERSION {
            log::error!(
                "filesystem is version {}; only version {VERSION} is supported",
                self.version
            );
            return Err(Error::Corrupted);
        }
        if self.free_inode != NILINO && self.free_inode >= self.num_inodes {
            log::error!("free inode head {} out of bounds", self.free_inode);
            return Err(Error::Corrupted);
        }
        if self.root_inode >= self.num_inodes {
            log::error!("root inode {} out of bounds", self.root_inode);
            return Err(Error::Corrupted);
        }
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), size_of::<Self>()) }
    }
}
