use block_dev::DevError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    AlreadyExists,
    NotFound,
    IsADirectory,
    NotADirectory,
    DirectoryNotEmpty,
    NameTooLong,
    InvalidArgument,
    /// 空闲 inode 或空闲块耗尽
    NoSpace,
    /// 挂载时发现的损坏，挂载干净地失败即可恢复
    Corrupted,
    /// 挂载成功之后才暴露的不变量破坏，没有修复路径
    Fatal,
    Device(DevError),
}

impl From<DevError> for Error {
    #[inline]
    fn from(err: DevError) -> Self {
        Self::Device(err)
    }
}
