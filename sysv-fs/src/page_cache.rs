//! # 页缓存层
//!
//! 页以 (对象, 页号) 为键：元数据页（超级块、inode 表、间接索引块）
//! 以设备块号为键，文件内容页以 (inode 编号, 页索引) 为键。
//!
//! 持有页的 [`Arc`] 即钉住该页：被钉住的页不会被换出，内存地址稳定。
//! 脏页在换出、[`PageCacheManager::sync_all`] 或析构时写回其后备块。

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::{BlockDevice, DevError};
use spin::Mutex;

use crate::BLOCK_SIZE;

/// 页大小与块大小一致
pub const PAGE_SIZE: usize = BLOCK_SIZE;

/// 元数据页的对象编号，不与任何 inode 编号冲突
const META_OBJECT: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageKey {
    object: u32,
    index: u32,
}

impl PageKey {
    /// 以设备块号为键的元数据页
    pub fn meta(block_id: u32) -> Self {
        Self {
            object: META_OBJECT,
            index: block_id,
        }
    }

    /// 文件内容页
    pub fn file(ino: u32, index: u32) -> Self {
        debug_assert_ne!(ino, META_OBJECT);
        Self { object: ino, index }
    }
}

/// 内存中的一页磁盘数据
pub struct Page {
    data: [u8; PAGE_SIZE],
    /// 后备块号；[`None`] 表示空洞页，读出即全零
    backing: Option<u32>,
    device: Arc<dyn BlockDevice>,
    dirty: bool,
}

impl Page {
    /// 有后备块则载入一页，否则填零
    fn new(backing: Option<u32>, device: Arc<dyn BlockDevice>) -> Result<Self, DevError> {
        let mut data = [0; PAGE_SIZE];
        if let Some(block_id) = backing {
            device.read_block(block_id as usize, &mut data)?;
        }
        Ok(Self {
            data,
            backing,
            device,
            dirty: false,
        })
    }

    pub fn backing(&self) -> Option<u32> {
        self.backing
    }

    /// 将空洞页提升为有后备块的页
    pub fn promote(&mut self, block_id: u32) {
        self.backing = Some(block_id);
        self.dirty = true;
    }

    fn offset(&self, count: usize) -> usize {
        let addr = self.data.as_ptr() as usize;
        addr + count
    }

    pub fn get<T>(&self, offset: usize) -> &T
    where
        T: Sized,
    {
        let type_size = size_of::<T>();
        assert!(offset + type_size <= PAGE_SIZE);
        let addr = self.offset(offset);
        unsafe { &*(addr as *const T) }
    }

    pub fn get_mut<T>(&mut self, offset: usize) -> &mut T
    where
        T: Sized,
    {
        let type_size = size_of::<T>();
        assert!(offset + type_size <= PAGE_SIZE);
        self.dirty = true;
        let addr = self.offset(offset);
        unsafe { &mut *(addr as *mut T) }
    }

    pub fn map<T, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(offset))
    }

    pub fn map_mut<T, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }

    /// 脏页写回后备块
    pub fn sync(&mut self) -> Result<(), DevError> {
        if self.dirty {
            // 脏的空洞页意味着写者跳过了 dirtypage 协议
            debug_assert!(self.backing.is_some());
            if let Some(block_id) = self.backing {
                self.device.write_block(block_id as usize, &self.data)?;
            }
            self.dirty = false;
        }
        Ok(())
    }

    /// 放弃缓存内容，不再写回
    fn discard(&mut self) {
        self.dirty = false;
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        if self.sync().is_err() {
            log::error!("page writeback failed on drop");
        }
    }
}

/// 每个挂载实例私有的页缓存管理器
pub struct PageCacheManager {
    device: Arc<dyn BlockDevice>,
    queue: Mutex<Vec<(PageKey, Arc<Mutex<Page>>)>>,
}

impl PageCacheManager {
    /// 缓存页数上限
    const CAPACITY: usize = 64;

    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        Self {
            device,
            queue: Mutex::new(Vec::new()),
        }
    }

    /// 取得键对应的缓存页，缺页时载入或填零。
    /// 缓存已满则换出一个未被钉住的页。
    pub fn get(&self, key: PageKey, backing: Option<u32>) -> Result<Arc<Mutex<Page>>, DevError> {
        let mut queue = self.queue.lock();
        if let Some(page) = queue
            .iter()
            .find_map(|(k, page)| (*k == key).then(|| Arc::clone(page)))
        {
            return Ok(page);
        }

        if queue.len() == Self::CAPACITY {
            // 只有无人引用的页才能换出
            let victim = queue
                .iter()
                .position(|(_, page)| Arc::strong_count(page) == 1)
                .expect("run out of page cache");
            let (_, page) = queue.remove(victim);
            page.lock().sync()?;
        }

        let page = Arc::new(Mutex::new(Page::new(backing, Arc::clone(&self.device))?));
        queue.push((key, Arc::clone(&page)));
        Ok(page)
    }

    /// 丢弃某对象的全部缓存页，不写回。
    /// inode 回收后它的页不得写回到已易主的块上。
    pub fn discard(&self, object: u32) {
        self.queue.lock().retain(|(key, page)| {
            let hit = key.object == object;
            if hit {
                page.lock().discard();
            }
            !hit
        });
    }

    /// 丢弃单个键的缓存页，不写回
    pub fn discard_key(&self, key: PageKey) {
        self.queue.lock().retain(|(k, page)| {
            let hit = *k == key;
            if hit {
                page.lock().discard();
            }
            !hit
        });
    }

    /// 全量写回脏页
    pub fn sync_all(&self) -> Result<(), DevError> {
        for (_, page) in self.queue.lock().iter() {
            page.lock().sync()?;
        }
        Ok(())
    }
}
