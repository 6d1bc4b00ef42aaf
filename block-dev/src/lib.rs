//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、光盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 传输以整块为单位，没有部分成功：要么整块完成，要么返回错误。

#![no_std]

use core::any::Any;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DevError>;
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DevError>;

    /// 冲刷设备自身的写缓存
    fn flush(&self) -> Result<(), DevError> {
        Ok(())
    }
}

/// 设备层错误，原样上抛给文件系统的调用者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevError {
    /// 块编号超出设备容量
    OutOfRange,
    /// 传输失败
    Io,
}
