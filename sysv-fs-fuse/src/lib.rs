use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use block_dev::{BlockDevice, DevError};
use sysv_fs::BLOCK_SIZE;

#[cfg(test)]
mod tests;

/// 宿主机文件模拟的块设备
pub struct BlockFile(pub Mutex<File>);

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DevError> {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .map_err(|_| DevError::Io)?;
        match file.read(buf) {
            Ok(n) if n == BLOCK_SIZE => Ok(()),
            Ok(_) => Err(DevError::OutOfRange),
            Err(_) => Err(DevError::Io),
        }
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DevError> {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .map_err(|_| DevError::Io)?;
        match file.write(buf) {
            Ok(n) if n == BLOCK_SIZE => Ok(()),
            Ok(_) => Err(DevError::OutOfRange),
            Err(_) => Err(DevError::Io),
        }
    }

    fn flush(&self) -> Result<(), DevError> {
        self.0.lock().unwrap().sync_all().map_err(|_| DevError::Io)
    }
}
