//! 文件数据与块映射。字节偏移经直接/一级间接索引翻译到块号，
//! 空洞读出即全零，首次写入时才分配。
//! fillpage / dirtypage / cleanpage 三个回调衔接外部页缓存与块设备。

use alloc::vec::Vec;

use vfs::{Error, Result};

use crate::fs::SysvFileSystem;
use crate::layout::{BLOCK_CAP, IndirectBlock, NDIRECT};
use crate::page_cache::PageKey;
use crate::vnode::Vnode;
use crate::{BLOCK_SIZE, DataBlock};

impl Vnode {
    /// 字节偏移翻译到块号，空洞返回哨兵 0。
    /// `alloc` 时就地物化空洞：所有块分配都经由这一个咽喉，
    /// 分配失败原样上抛，索引槽保持原状。
    pub(crate) fn seek_to_block(
        &self,
        offset: usize,
        alloc: bool,
        fs: &SysvFileSystem,
    ) -> Result<u32> {
        let index = offset / BLOCK_SIZE;
        if index >= BLOCK_CAP {
            return Err(Error::InvalidArgument);
        }

        if index < NDIRECT {
            let block = self.meta(|record| record.direct[index]);
            if block != 0 || !alloc {
                return Ok(block);
            }
            let block = fs.alloc_block()?;
            self.meta_mut(|record| record.direct[index] = block);
            return Ok(block);
        }

        // 一级间接索引
        let index = index - NDIRECT;
        let indirect = self.meta(|record| record.indirect);
        if indirect == 0 {
            if !alloc {
                return Ok(0);
            }
            // 先拿数据块、再拿索引块，最后才挂进 inode：
            // 中途耗尽时把拿到的块都退回去，索引槽保持原状
            let block = fs.alloc_block()?;
            let indirect = match fs.alloc_block() {
                Ok(id) => id,
                Err(err) => {
                    fs.free_block(block)?;
                    return Err(err);
                }
            };
            // 新块由分配器清零，直接当空索引表用
            let page = match fs.pages().get(PageKey::meta(indirect), Some(indirect)) {
                Ok(page) => page,
                Err(err) => {
                    fs.free_block(block)?;
                    fs.free_block(indirect)?;
                    return Err(err.into());
                }
            };
            page.lock()
                .map_mut(0, |table: &mut IndirectBlock| table[index] = block);
            self.meta_mut(|record| record.indirect = indirect);
            return Ok(block);
        }
        let page = fs.pages().get(PageKey::meta(indirect), Some(indirect))?;
        let block = page.lock().map(0, |table: &IndirectBlock| table[index]);
        if block != 0 || !alloc {
            return Ok(block);
        }
        let block = fs.alloc_block()?;
        page.lock()
            .map_mut(0, |table: &mut IndirectBlock| table[index] = block);
        Ok(block)
    }

    /// 从指定偏移读出数据填充 `buf`，超出文件尾的部分截掉
    pub fn read_at(&self, offset: usize, buf: &mut [u8], fs: &SysvFileSystem) -> Result<usize> {
        if self.is_dir() {
            return Err(Error::IsADirectory);
        }
        let _guard = self.lock.lock();
        self.read_raw(offset, buf, fs)
    }

    /// 向指定偏移写入 `buf`，必要时延长文件
    pub fn write_at(&self, offset: usize, buf: &[u8], fs: &SysvFileSystem) -> Result<usize> {
        if self.is_dir() {
            return Err(Error::IsADirectory);
        }
        let _guard = self.lock.lock();
        self.write_raw(offset, buf, fs)
    }

    pub(crate) fn read_raw(
        &self,
        offset: usize,
        buf: &mut [u8],
        fs: &SysvFileSystem,
    ) -> Result<usize> {
        let size = self.size() as usize;
        let end = (offset + buf.len()).min(size);
        if offset >= end {
            return Ok(0);
        }

        let mut read = 0;
        let mut start = offset;
        while start < end {
            let index = start / BLOCK_SIZE;
            let block_end = ((index + 1) * BLOCK_SIZE).min(end);
            let len = block_end - start;
            let dest = &mut buf[read..read + len];

            let block = self.seek_to_block(start, false, fs)?;
            let key = PageKey::file(self.ino(), index as u32);
            let page = fs.pages().get(key, (block != 0).then_some(block))?;
            page.lock().map(0, |data: &DataBlock| {
                let begin = start % BLOCK_SIZE;
                dest.copy_from_slice(&data[begin..begin + len]);
            });

            read += len;
            start = block_end;
        }
        Ok(read)
    }

    pub(crate) fn write_raw(
        &self,
        offset: usize,
        buf: &[u8],
        fs: &SysvFileSystem,
    ) -> Result<usize> {
        let end = offset + buf.len();
        if end > BLOCK_CAP * BLOCK_SIZE {
            return Err(Error::InvalidArgument);
        }

        let mut written = 0;
        let mut start = offset;
        while start < end {
            let index = start / BLOCK_SIZE;
            let block_end = ((index + 1) * BLOCK_SIZE).min(end);
            let len = block_end - start;
            let src = &buf[written..written + len];

            // 先保证后备块，再染脏页面
            let block = self.seek_to_block(start, true, fs)?;
            let key = PageKey::file(self.ino(), index as u32);
            let page = fs.pages().get(key, Some(block))?;
            {
                let mut page = page.lock();
                // 早先作为空洞缓存的页在此接上后备块
                if page.backing() != Some(block) {
                    page.promote(block);
                }
                page.map_mut(0, |data: &mut DataBlock| {
                    let begin = start % BLOCK_SIZE;
                    data[begin..begin + len].copy_from_slice(src);
                });
            }

            // 大小随写入逐块推进，中途出错也只见已写到的地方
            if (self.size() as usize) < block_end {
                self.meta_mut(|record| record.size = block_end as u32);
            }
            written += len;
            start = block_end;
        }
        Ok(written)
    }

    /// 外部页缓存读缺页时调用：空洞直接填零，不触碰设备；
    /// 其余经由共享页缓存读出，尚未落盘的写入同样看得见
    pub fn fillpage(&self, offset: usize, buf: &mut [u8], fs: &SysvFileSystem) -> Result<()> {
        debug_assert_eq!(buf.len(), BLOCK_SIZE);
        let _guard = self.lock.lock();
        let block = self.seek_to_block(offset, false, fs)?;
        if block == 0 {
            buf.fill(0);
            return Ok(());
        }
        let key = PageKey::file(self.ino(), (offset / BLOCK_SIZE) as u32);
        let page = fs.pages().get(key, Some(block))?;
        page.lock()
            .map(0, |data: &DataBlock| buf.copy_from_slice(data));
        Ok(())
    }

    /// 页面变为可写之前调用：空洞在此提升为实打实的块，
    /// 已有后备块则为空操作
    pub fn dirtypage(&self, offset: usize, fs: &SysvFileSystem) -> Result<()> {
        let _guard = self.lock.lock();
        if self.seek_to_block(offset, false, fs)? != 0 {
            return Ok(());
        }
        self.seek_to_block(offset, true, fs)?;
        Ok(())
    }

    /// 外部页缓存回写时调用。走过 dirtypage 的页必有后备块，
    /// 这里防御性地再分配一次。内容先落进共享页缓存再同步到
    /// 设备，后续读取不会绕过它
    pub fn cleanpage(&self, offset: usize, buf: &[u8], fs: &SysvFileSystem) -> Result<()> {
        debug_assert_eq!(buf.len(), BLOCK_SIZE);
        let _guard = self.lock.lock();
        let block = self.seek_to_block(offset, true, fs)?;
        let key = PageKey::file(self.ino(), (offset / BLOCK_SIZE) as u32);
        let page = fs.pages().get(key, Some(block))?;
        let mut page = page.lock();
        if page.backing() != Some(block) {
            page.promote(block);
        }
        page.map_mut(0, |data: &mut DataBlock| data.copy_from_slice(buf));
        page.sync()?;
        Ok(())
    }

    /// 实际占用的块数：已分配的数据块，加上间接索引块本身
    pub(crate) fn count_blocks(&self, fs: &SysvFileSystem) -> Result<usize> {
        let (direct, indirect) = self.meta(|record| (record.direct, record.indirect));
        let mut total = direct.iter().filter(|block| **block != 0).count();
        if indirect != 0 {
            total += 1;
            let page = fs.pages().get(PageKey::meta(indirect), Some(indirect))?;
            total += page.lock().map(0, |table: &IndirectBlock| {
                table.iter().filter(|block| **block != 0).count()
            });
        }
        Ok(total)
    }

    /// 摘下全部已分配块并清空索引，由调用者归还空闲链表
    pub(crate) fn take_blocks(&self, fs: &SysvFileSystem) -> Result<Vec<u32>> {
        let (direct, indirect) = self.meta_mut(|record| {
            let taken = (record.direct, record.indirect);
            record.direct = [0; NDIRECT];
            record.indirect = 0;
            record.size = 0;
            taken
        });

        let mut blocks: Vec<u32> = direct.iter().copied().filter(|block| *block != 0).collect();
        if indirect != 0 {
            let page = fs.pages().get(PageKey::meta(indirect), Some(indirect))?;
            page.lock().map(0, |table: &IndirectBlock| {
                blocks.extend(table.iter().copied().filter(|block| *block != 0));
            });
            blocks.push(indirect);
        }
        Ok(blocks)
    }
}
