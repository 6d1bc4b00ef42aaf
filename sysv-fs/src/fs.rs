//! # 磁盘块管理器层
//!
//! 在页缓存之上组织磁盘布局：挂载与卸载、inode 与数据块的
//! 链表分配器、驻留 vnode 表，以及卸载前的链接数一致性检查。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use spin::{Mutex, Once};
use vfs::{Error, Result};

use crate::layout::{DirEntry, DiskInode, InodeKind, SuperBlock};
use crate::page_cache::{Page, PageCacheManager, PageKey};
use crate::vnode::Vnode;
use crate::{BLOCK_SIZE, NILINO};

const SUPER_BLOCK_ID: u32 = 0;
const INODE_AREA_START: u32 = 1;
const ROOT_INO: u32 = 0;
const INODES_PER_BLOCK: u32 = (BLOCK_SIZE / DiskInode::SIZE) as u32;

/// 空闲链表的内存缓存表头，变更即写穿到超级块页
struct FreeLists {
    inode_head: u32,
    block_head: u32,
}

struct VnodeSlot {
    vnode: Arc<Vnode>,
    /// 文件系统层发放的引用数，独立于 Arc 计数
    refs: usize,
}

pub struct SysvFileSystem {
    device: Arc<dyn BlockDevice>,
    pages: PageCacheManager,
    /// 挂载期间钉住的超级块页
    super_page: Arc<Mutex<Page>>,
    /// 空闲链表是全文件系统共享资源，由分配锁串行化
    alloc: Mutex<FreeLists>,
    /// 驻留 vnode 表
    vnodes: Mutex<BTreeMap<u32, VnodeSlot>>,
    root: Once<Arc<Vnode>>,
    num_inodes: u32,
}

impl SysvFileSystem {
    /// 校验超级块并物化根目录。失败时不在设备上留下任何痕迹。
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Arc<Self>> {
        let pages = PageCacheManager::new(Arc::clone(&device));
        let super_page = pages.get(PageKey::meta(SUPER_BLOCK_ID), Some(SUPER_BLOCK_ID))?;

        let guard = super_page.lock();
        let sb: &SuperBlock = guard.get(0);
        sb.check()?;
        let (num_inodes, inode_head, block_head, root_ino) =
            (sb.num_inodes, sb.free_inode, sb.free_block, sb.root_inode);
        drop(guard);

        let fs = Arc::new(Self {
            device,
            pages,
            super_page,
            alloc: Mutex::new(FreeLists {
                inode_head,
                block_head,
            }),
            vnodes: Mutex::new(BTreeMap::new()),
            root: Once::new(),
            num_inodes,
        });
        let root = fs.vget(root_ino)?;
        fs.root.call_once(|| root);

        log::info!("mounted: {num_inodes} inodes, root inode {root_ino}");
        Ok(fs)
    }

    /// 卸载前重算整棵目录树的链接数并与磁盘比对，
    /// 再复验超级块。挂载成功后这些不变量理应一直成立，
    /// 破坏即驱动缺陷，以 [`Error::Fatal`] 上报。
    pub fn unmount(self: Arc<Self>) -> Result<()> {
        self.check_link_counts()?;
        self.super_page
            .lock()
            .map(0, |sb: &SuperBlock| sb.check())
            .map_err(|_| Error::Fatal)?;

        self.vput(self.root())?;
        let leaked = self.vnodes.lock().len();
        if leaked > 0 {
            log::error!("{leaked} vnodes still referenced at unmount");
            return Err(Error::Fatal);
        }

        self.pages.sync_all()?;
        self.device.flush()?;
        log::info!("unmounted");
        Ok(())
    }

    /// 在设备上建立新的文件系统，随后挂载。
    /// 布局：超级块 | inode 表 | 数据块区域，根目录占用首个数据块。
    pub fn format(
        device: Arc<dyn BlockDevice>,
        total_blocks: u32,
        num_inodes: u32,
    ) -> Result<Arc<Self>> {
        let inode_blocks = num_inodes.div_ceil(INODES_PER_BLOCK);
        let data_start = INODE_AREA_START + inode_blocks;
        if num_inodes == 0 || total_blocks <= data_start {
            return Err(Error::InvalidArgument);
        }

        let mut buf = vec![0u8; BLOCK_SIZE];

        // inode 表：0 号给根目录，其余记录串成空闲链表
        for block in 0..inode_blocks {
            buf.fill(0);
            for i in 0..INODES_PER_BLOCK {
                let ino = block * INODES_PER_BLOCK + i;
                if ino >= num_inodes {
                    break;
                }
                let mut record = DiskInode::default();
                if ino == ROOT_INO {
                    record.init(InodeKind::Directory, 0);
                    // 一条链接来自它自己的 ".."
                    record.links = 1;
                    record.size = (2 * DirEntry::SIZE) as u32;
                    record.direct[0] = data_start;
                } else {
                    let next = if ino + 1 < num_inodes { ino + 1 } else { NILINO };
                    record.set_free(next);
                }
                let offset = (i as usize) * DiskInode::SIZE;
                buf[offset..offset + DiskInode::SIZE].copy_from_slice(record.as_bytes());
            }
            device.write_block((INODE_AREA_START + block) as usize, &buf)?;
        }

        // 根目录内容
        buf.fill(0);
        buf[..DirEntry::SIZE].copy_from_slice(DirEntry::new(".", ROOT_INO).as_bytes());
        buf[DirEntry::SIZE..2 * DirEntry::SIZE]
            .copy_from_slice(DirEntry::new("..", ROOT_INO).as_bytes());
        device.write_block(data_start as usize, &buf)?;

        // 其余数据块串成空闲链表，块首的 u32 存下一空闲块号
        for block in data_start + 1..total_blocks {
            let next = if block + 1 < total_blocks { block + 1 } else { 0 };
            buf.fill(0);
            buf[..4].copy_from_slice(&next.to_le_bytes());
            device.write_block(block as usize, &buf)?;
        }

        let inode_head = if num_inodes > 1 { 1 } else { NILINO };
        let block_head = if data_start + 1 < total_blocks {
            data_start + 1
        } else {
            0
        };
        let sb = SuperBlock::new(num_inodes, inode_head, block_head, ROOT_INO, total_blocks);
        buf.fill(0);
        buf[..size_of::<SuperBlock>()].copy_from_slice(sb.as_bytes());
        device.write_block(SUPER_BLOCK_ID as usize, &buf)?;

        log::info!("formatted: {total_blocks} blocks, {num_inodes} inodes");
        Self::mount(device)
    }

    /// 根目录 vnode；挂载期间始终被文件系统层自身持有
    pub fn root(&self) -> Arc<Vnode> {
        Arc::clone(self.root.get().expect("filesystem is not mounted"))
    }

    /// 通过编号定位 inode 记录：所在块号与块内偏移
    fn inode_pos(&self, ino: u32) -> (u32, usize) {
        let block_id = INODE_AREA_START + ino / INODES_PER_BLOCK;
        let offset = (ino % INODES_PER_BLOCK) as usize * DiskInode::SIZE;
        (block_id, offset)
    }

    /// 物化或复用驻留的 vnode，发放一份引用。
    ///
    /// 按约定，首次物化把磁盘链接数加一：文件系统层的持有
    /// 本身计为一条链接，于是未驻留文件的链接数就是目录项数。
    pub fn vget(&self, ino: u32) -> Result<Arc<Vnode>> {
        if ino >= self.num_inodes {
            return Err(Error::Corrupted);
        }
        let mut vnodes = self.vnodes.lock();
        if let Some(slot) = vnodes.get_mut(&ino) {
            slot.refs += 1;
            return Ok(Arc::clone(&slot.vnode));
        }

        // inode 所在页在驻留期间保持钉住
        let (block_id, offset) = self.inode_pos(ino);
        let page = self.pages.get(PageKey::meta(block_id), Some(block_id))?;
        let mut guard = page.lock();
        let record: &mut DiskInode = guard.get_mut(offset);
        if record.is_free() {
            log::error!("inode {ino} is on the free list but still referenced");
            return Err(Error::Corrupted);
        }
        record.links += 1;
        let (kind, devid) = (record.kind, record.devid);
        drop(guard);

        log::trace!("materialized inode {ino}, {kind:?}");
        let vnode = Arc::new(Vnode::new(ino, kind, devid, page, offset));
        vnodes.insert(
            ino,
            VnodeSlot {
                vnode: Arc::clone(&vnode),
                refs: 1,
            },
        );
        Ok(vnode)
    }

    /// 归还一份 vnode 引用。最后一份归还时撤销物化时加上的
    /// 那条链接；链接数就此归零的 inode 连同其数据块回到空闲链表。
    pub fn vput(&self, vnode: Arc<Vnode>) -> Result<()> {
        let ino = vnode.ino();
        let mut vnodes = self.vnodes.lock();
        let Some(slot) = vnodes.get_mut(&ino) else {
            log::error!("vput of non-resident inode {ino}");
            return Err(Error::InvalidArgument);
        };
        slot.refs -= 1;
        if slot.refs > 0 {
            return Ok(());
        }
        vnodes.remove(&ino);
        // 回收期间不占着驻留表
        drop(vnodes);

        let links = vnode.meta_mut(|record| {
            record.links -= 1;
            record.links
        });
        if links == 0 {
            log::trace!("reclaiming inode {ino}");
            let blocks = vnode.take_blocks(self)?;
            self.pages.discard(ino);
            for block in blocks {
                self.free_block(block)?;
            }
            self.free_inode(ino)?;
        }
        Ok(())
    }

    /// 外层缓存据此决定是否继续驻留：除文件系统层自身的
    /// 持有外，是否还有别的链接
    pub fn is_referenced(&self, vnode: &Vnode) -> bool {
        vnode.meta(|record| record.links) > 1
    }

    /// 从空闲链表弹出一个 inode 并初始化。调用者随后 vget 它。
    pub(crate) fn alloc_inode(&self, kind: InodeKind, devid: u32) -> Result<u32> {
        let mut lists = self.alloc.lock();
        let ino = lists.inode_head;
        if ino == NILINO {
            return Err(Error::NoSpace);
        }

        let (block_id, offset) = self.inode_pos(ino);
        let page = self.pages.get(PageKey::meta(block_id), Some(block_id))?;
        let next = page.lock().map_mut(offset, |record: &mut DiskInode| {
            let next = record.next_free();
            record.init(kind, devid);
            next
        });
        lists.inode_head = next;
        self.super_page
            .lock()
            .map_mut(0, |sb: &mut SuperBlock| sb.free_inode = next);
        log::trace!("allocated inode {ino}, {kind:?}");
        Ok(ino)
    }

    /// 空闲 inode 采用 LIFO：刚释放的编号最先被复用
    fn free_inode(&self, ino: u32) -> Result<()> {
        let mut lists = self.alloc.lock();
        let (block_id, offset) = self.inode_pos(ino);
        let page = self.pages.get(PageKey::meta(block_id), Some(block_id))?;
        page.lock().map_mut(offset, |record: &mut DiskInode| {
            record.set_free(lists.inode_head);
        });
        lists.inode_head = ino;
        self.super_page
            .lock()
            .map_mut(0, |sb: &mut SuperBlock| sb.free_inode = ino);
        log::trace!("freed inode {ino}");
        Ok(())
    }

    /// 从空闲链表弹出一块。链表指针直接走设备而不经页缓存，
    /// 且新块先在设备上清零再交给调用者。
    pub(crate) fn alloc_block(&self) -> Result<u32> {
        let mut lists = self.alloc.lock();
        let block_id = lists.block_head;
        if block_id == 0 {
            return Err(Error::NoSpace);
        }

        let mut buf = vec![0u8; BLOCK_SIZE];
        self.device.read_block(block_id as usize, &mut buf)?;
        let next = u32::from_le_bytes(buf[..4].try_into().unwrap());
        buf.fill(0);
        self.device.write_block(block_id as usize, &buf)?;

        lists.block_head = next;
        self.super_page
            .lock()
            .map_mut(0, |sb: &mut SuperBlock| sb.free_block = next);
        log::trace!("allocated block {block_id}");
        Ok(block_id)
    }

    pub(crate) fn free_block(&self, block_id: u32) -> Result<()> {
        // 该块可能作为间接索引块留有缓存页，不得再写回
        self.pages.discard_key(PageKey::meta(block_id));

        let mut lists = self.alloc.lock();
        let mut buf = vec![0u8; BLOCK_SIZE];
        buf[..4].copy_from_slice(&lists.block_head.to_le_bytes());
        self.device.write_block(block_id as usize, &buf)?;

        lists.block_head = block_id;
        self.super_page
            .lock()
            .map_mut(0, |sb: &mut SuperBlock| sb.free_block = block_id);
        log::trace!("freed block {block_id}");
        Ok(())
    }

    pub(crate) fn pages(&self) -> &PageCacheManager {
        &self.pages
    }

    /// 从根出发重算每个 inode 的期望链接数，与磁盘上的
    /// (链接数 - 1) 比对；减一抵掉比对期间我们自己的持有。
    fn check_link_counts(&self) -> Result<()> {
        let mut expected = vec![0u32; self.num_inodes as usize];
        let root_ino = self.root().ino();

        // 深度优先，显式栈代替递归，不受内核栈深度限制
        let root = self.vget(root_ino).map_err(|_| Error::Fatal)?;
        expected[root_ino as usize] += 1;
        let mut stack: Vec<(Arc<Vnode>, usize)> = vec![(root, 0)];

        let walked: Result<()> = (|| {
            while let Some((dir, offset)) = stack.pop() {
                match dir.readdir(offset, self) {
                    Err(err) => {
                        // 留在栈上，由统一的善后路径归还
                        stack.push((dir, offset));
                        return Err(err);
                    }
                    Ok(None) => self.vput(dir)?,
                    Ok(Some((entry, next))) => {
                        stack.push((dir, next));
                        if entry.name.is_empty() || entry.name == "." {
                            continue;
                        }
                        let ino = entry.inode as u32;
                        let child = self.vget(ino)?;
                        expected[ino as usize] += 1;
                        // 每个子树只下降一次，".." 与硬链接不会成环
                        if expected[ino as usize] == 1 && child.is_dir() {
                            stack.push((child, 0));
                        } else {
                            self.vput(child)?;
                        }
                    }
                }
            }
            Ok(())
        })();
        if let Err(err) = walked {
            log::error!("link-count walk aborted: {err:?}");
            for (vnode, _) in stack.drain(..) {
                self.vput(vnode).ok();
            }
            return Err(Error::Fatal);
        }
        // 根是遍历入口而非被谁发现的，补偿减一
        expected[root_ino as usize] -= 1;

        let mut consistent = true;
        for (ino, &count) in expected.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let vnode = self.vget(ino as u32).map_err(|_| Error::Fatal)?;
            let links = vnode.links() - 1;
            if links != count {
                log::error!("inode {ino}: expected {count} links, found {links}");
                consistent = false;
            }
            self.vput(vnode)?;
        }
        if consistent { Ok(()) } else { Err(Error::Fatal) }
    }
}
