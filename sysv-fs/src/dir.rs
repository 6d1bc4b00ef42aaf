//! 目录操作。目录内容是定长目录项的线性序列：查找即全表扫描，
//! 删除打墓碑，插入优先复用墓碑槽。

use alloc::string::ToString;
use alloc::sync::Arc;

use vfs::{DirEntry as Dirent, DirEntryType, Error, Result};

use crate::fs::SysvFileSystem;
use crate::layout::{DirEntry, InodeKind, NAME_LEN};
use crate::vnode::Vnode;

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument);
    }
    if name.len() > NAME_LEN {
        return Err(Error::NameTooLong);
    }
    Ok(())
}

impl Vnode {
    /// 按名字解析子项，物化其 vnode 并发放一份引用
    pub fn lookup(&self, name: &str, fs: &SysvFileSystem) -> Result<Arc<Vnode>> {
        check_name(name)?;
        let _guard = self.lock.lock();
        if !self.is_dir() {
            return Err(Error::NotADirectory);
        }
        let (_, ino) = self.find_dirent(name, fs)?;
        fs.vget(ino)
    }

    /// 创建普通文件，返回持有中的 vnode，由调用者 vput
    pub fn create(&self, name: &str, fs: &SysvFileSystem) -> Result<Arc<Vnode>> {
        check_name(name)?;
        let _guard = self.lock.lock();
        if !self.is_dir() {
            return Err(Error::NotADirectory);
        }
        self.ensure_absent(name, fs)?;

        let ino = fs.alloc_inode(InodeKind::File, 0)?;
        let vnode = fs.vget(ino)?;
        if let Err(err) = self.insert_dirent(name, &vnode, fs) {
            // 新 inode 还没有目录项，归还仅有的引用即回收
            fs.vput(vnode)?;
            return Err(err);
        }
        Ok(vnode)
    }

    /// 创建字符或块设备文件
    pub fn mknod(
        &self,
        name: &str,
        kind: DirEntryType,
        devid: u32,
        fs: &SysvFileSystem,
    ) -> Result<()> {
        check_name(name)?;
        let kind = match kind {
            DirEntryType::Char => InodeKind::CharDev,
            DirEntryType::Block => InodeKind::BlockDev,
            _ => return Err(Error::InvalidArgument),
        };
        let _guard = self.lock.lock();
        if !self.is_dir() {
            return Err(Error::NotADirectory);
        }
        self.ensure_absent(name, fs)?;

        let ino = fs.alloc_inode(kind, devid)?;
        let vnode = fs.vget(ino)?;
        let status = self.insert_dirent(name, &vnode, fs);
        fs.vput(vnode)?;
        status
    }

    /// 为已存在的 inode 建立新的硬链接。
    /// 跨 vnode 操作，两把锁按编号序获取。
    pub fn link(&self, target: &Vnode, name: &str, fs: &SysvFileSystem) -> Result<()> {
        check_name(name)?;
        let _guards = Vnode::lock_pair(self, target);
        if !self.is_dir() {
            return Err(Error::NotADirectory);
        }
        self.ensure_absent(name, fs)?;
        self.insert_dirent(name, target, fs)
    }

    /// 移除一条指向非目录的目录项。失去最后一条链接且
    /// 无人驻留的 inode 随即回收。
    pub fn unlink(&self, name: &str, fs: &SysvFileSystem) -> Result<()> {
        check_name(name)?;
        if name == "." || name == ".." {
            return Err(Error::InvalidArgument);
        }
        let _guard = self.lock.lock();
        if !self.is_dir() {
            return Err(Error::NotADirectory);
        }

        let (slot, ino) = self.find_dirent(name, fs)?;
        let target = fs.vget(ino)?;
        if target.is_dir() {
            fs.vput(target)?;
            return Err(Error::IsADirectory);
        }
        self.write_raw(slot, DirEntry::tombstone().as_bytes(), fs)?;
        target.meta_mut(|record| record.links -= 1);
        fs.vput(target)
    }

    /// 创建子目录。新目录驻留期间链接数为 2（父目录项加持有），
    /// 归还后余 1，即它自己的 ".."。
    pub fn mkdir(&self, name: &str, fs: &SysvFileSystem) -> Result<()> {
        check_name(name)?;
        let _guard = self.lock.lock();
        if !self.is_dir() {
            return Err(Error::NotADirectory);
        }
        self.ensure_absent(name, fs)?;

        let ino = fs.alloc_inode(InodeKind::Directory, 0)?;
        let new = fs.vget(ino)?;
        let status = (|| {
            self.insert_dirent(name, &new, fs)?;
            // "." 自链接按约定不计数
            new.insert_dirent(".", &new, fs)?;
            new.insert_dirent("..", self, fs)
        })();
        fs.vput(new)?;
        status
    }

    /// 删除空目录。两次目录项移除并不原子，中途断电会留下
    /// 悬挂的子目录，由卸载检查兜底。
    pub fn rmdir(&self, name: &str, fs: &SysvFileSystem) -> Result<()> {
        check_name(name)?;
        if name == "." || name == ".." {
            return Err(Error::InvalidArgument);
        }
        let _guard = self.lock.lock();
        if !self.is_dir() {
            return Err(Error::NotADirectory);
        }

        let (slot, ino) = self.find_dirent(name, fs)?;
        let target = fs.vget(ino)?;
        let status = (|| {
            if !target.is_dir() {
                return Err(Error::NotADirectory);
            }

            // 除 "." 与 ".." 外不得有存活目录项
            let mut offset = 0;
            while let Some((entry, next)) = target.readdir_raw(offset, fs)? {
                let name = entry.name()?;
                if !name.is_empty() && name != "." && name != ".." {
                    return Err(Error::DirectoryNotEmpty);
                }
                offset = next;
            }

            // 先摘 ".."（撤销对父目录的链接），再摘父目录项
            let (dotdot, _) = target.find_dirent("..", fs)?;
            target.write_raw(dotdot, DirEntry::tombstone().as_bytes(), fs)?;
            self.meta_mut(|record| record.links -= 1);
            self.write_raw(slot, DirEntry::tombstone().as_bytes(), fs)?;
            target.meta_mut(|record| record.links -= 1);
            Ok(())
        })();
        fs.vput(target)?;
        status
    }

    /// 返回 offset 处的目录项与续读偏移，尾部返回 [`None`]。
    /// 墓碑以空名字原样上报，跳过与否由调用者决定。
    pub fn readdir(&self, offset: usize, fs: &SysvFileSystem) -> Result<Option<(Dirent, usize)>> {
        let _guard = self.lock.lock();
        if !self.is_dir() {
            return Err(Error::NotADirectory);
        }
        match self.readdir_raw(offset, fs)? {
            None => Ok(None),
            Some((entry, next)) => {
                let dirent = Dirent {
                    inode: entry.ino() as u64,
                    name: entry.name()?.to_string(),
                };
                Ok(Some((dirent, next)))
            }
        }
    }

    fn readdir_raw(&self, offset: usize, fs: &SysvFileSystem) -> Result<Option<(DirEntry, usize)>> {
        let mut entry = DirEntry::default();
        let read = self.read_raw(offset, entry.as_bytes_mut(), fs)?;
        if read == 0 {
            return Ok(None);
        }
        debug_assert_eq!(read, DirEntry::SIZE);
        Ok(Some((entry, offset + DirEntry::SIZE)))
    }

    /// 全表扫描，命中返回 (槽位偏移, inode 编号)
    fn find_dirent(&self, name: &str, fs: &SysvFileSystem) -> Result<(usize, u32)> {
        let mut offset = 0;
        while let Some((entry, next)) = self.readdir_raw(offset, fs)? {
            if !entry.is_empty() && entry.name()? == name {
                return Ok((offset, entry.ino()));
            }
            offset = next;
        }
        Err(Error::NotFound)
    }

    fn ensure_absent(&self, name: &str, fs: &SysvFileSystem) -> Result<()> {
        match self.find_dirent(name, fs) {
            Ok(_) => Err(Error::AlreadyExists),
            Err(Error::NotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// 首个墓碑槽，没有则为追加到尾部的偏移
    fn free_slot(&self, fs: &SysvFileSystem) -> Result<usize> {
        let mut offset = 0;
        while let Some((entry, next)) = self.readdir_raw(offset, fs)? {
            if entry.is_empty() {
                return Ok(offset);
            }
            offset = next;
        }
        Ok(offset)
    }

    /// 写入目录项并为目标加一条链接；"." 自链接按约定不计
    fn insert_dirent(&self, name: &str, target: &Vnode, fs: &SysvFileSystem) -> Result<()> {
        let slot = self.free_slot(fs)?;
        let entry = DirEntry::new(name, target.ino());
        self.write_raw(slot, entry.as_bytes(), fs)?;
        if name != "." {
            target.meta_mut(|record| record.links += 1);
        }
        Ok(())
    }
}
