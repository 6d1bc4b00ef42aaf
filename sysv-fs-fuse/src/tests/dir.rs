use block_dev::BlockDevice;
use sysv_fs::{BLOCK_SIZE, SysvFileSystem};
use vfs::{DirEntryType, Error};

use super::{fresh, pattern};

#[test]
fn dot_and_dotdot_resolution() {
    let (_disk, volume) = fresh(64, 32);
    let root = volume.root();

    root.mkdir("d", &volume).unwrap();
    let d = root.lookup("d", &volume).unwrap();

    let same = d.lookup(".", &volume).unwrap();
    assert_eq!(same.ino(), d.ino());
    volume.vput(same).unwrap();

    let parent = d.lookup("..", &volume).unwrap();
    assert_eq!(parent.ino(), root.ino());
    volume.vput(parent).unwrap();

    // 根目录的 ".." 指向自己
    let top = root.lookup("..", &volume).unwrap();
    assert_eq!(top.ino(), root.ino());
    volume.vput(top).unwrap();

    volume.vput(d).unwrap();
    drop(root);
    volume.unmount().unwrap();
}

#[test]
fn mkdir_rmdir_restores_parent_links() {
    let (_disk, volume) = fresh(64, 32);
    let root = volume.root();
    let before = root.links();

    root.mkdir("d", &volume).unwrap();
    // 子目录的 ".." 给父目录添了一条链接
    assert_eq!(root.links(), before + 1);

    let d = root.lookup("d", &volume).unwrap();
    assert_eq!(d.links(), 2);
    let freed = d.ino();
    volume.vput(d).unwrap();

    root.rmdir("d", &volume).unwrap();
    assert_eq!(root.links(), before);
    assert_eq!(root.lookup("d", &volume).err(), Some(Error::NotFound));

    // 空闲链表 LIFO：刚回收的 inode 最先复用
    let f = root.create("f", &volume).unwrap();
    assert_eq!(f.ino(), freed);
    volume.vput(f).unwrap();

    drop(root);
    volume.unmount().unwrap();
}

#[test]
fn rmdir_rejects_misuse() {
    let (_disk, volume) = fresh(64, 32);
    let root = volume.root();

    assert_eq!(root.rmdir(".", &volume), Err(Error::InvalidArgument));
    assert_eq!(root.rmdir("..", &volume), Err(Error::InvalidArgument));

    let f = root.create("f", &volume).unwrap();
    volume.vput(f).unwrap();
    assert_eq!(root.rmdir("f", &volume), Err(Error::NotADirectory));

    root.mkdir("d", &volume).unwrap();
    let d = root.lookup("d", &volume).unwrap();
    let child = d.create("inner", &volume).unwrap();
    volume.vput(child).unwrap();
    assert_eq!(root.rmdir("d", &volume), Err(Error::DirectoryNotEmpty));

    d.unlink("inner", &volume).unwrap();
    volume.vput(d).unwrap();
    root.rmdir("d", &volume).unwrap();

    root.unlink("f", &volume).unwrap();
    drop(root);
    volume.unmount().unwrap();
}

#[test]
fn name_errors() {
    let (_disk, volume) = fresh(64, 32);
    let root = volume.root();

    let f = root.create("f", &volume).unwrap();
    volume.vput(f).unwrap();
    assert_eq!(root.create("f", &volume).err(), Some(Error::AlreadyExists));
    assert_eq!(root.mkdir("f", &volume), Err(Error::AlreadyExists));

    let long = "x".repeat(28);
    assert_eq!(root.create(&long, &volume).err(), Some(Error::NameTooLong));
    assert_eq!(
        root.lookup(&long, &volume).err(),
        Some(Error::NameTooLong)
    );

    assert_eq!(
        root.lookup("missing", &volume).err(),
        Some(Error::NotFound)
    );

    // 普通文件上没有名字空间操作
    let f = root.lookup("f", &volume).unwrap();
    assert_eq!(f.lookup("x", &volume).err(), Some(Error::NotADirectory));
    volume.vput(f).unwrap();

    root.unlink("f", &volume).unwrap();
    drop(root);
    volume.unmount().unwrap();
}

#[test]
fn hard_links_share_data() {
    let (_disk, volume) = fresh(64, 32);
    let root = volume.root();
    let data = pattern(100);

    let a = root.create("a", &volume).unwrap();
    a.write_at(0, &data, &volume).unwrap();
    root.link(&a, "b", &volume).unwrap();
    assert_eq!(a.links(), 3);
    volume.vput(a).unwrap();

    root.unlink("a", &volume).unwrap();
    let b = root.lookup("b", &volume).unwrap();
    assert_eq!(b.links(), 2);
    let mut buf = vec![0; data.len()];
    b.read_at(0, &mut buf, &volume).unwrap();
    assert_eq!(buf, data);
    volume.vput(b).unwrap();

    assert_eq!(root.link(&root, "b", &volume), Err(Error::AlreadyExists));

    root.unlink("b", &volume).unwrap();
    drop(root);
    volume.unmount().unwrap();
}

#[test]
fn unlink_refuses_directories() {
    let (_disk, volume) = fresh(64, 32);
    let root = volume.root();

    root.mkdir("d", &volume).unwrap();
    assert_eq!(root.unlink("d", &volume), Err(Error::IsADirectory));
    assert_eq!(root.unlink(".", &volume), Err(Error::InvalidArgument));

    root.rmdir("d", &volume).unwrap();
    drop(root);
    volume.unmount().unwrap();
}

#[test]
fn mknod_device_files() {
    let (_disk, volume) = fresh(64, 32);
    let root = volume.root();

    root.mknod("tty", DirEntryType::Char, 0x0501, &volume).unwrap();
    let tty = root.lookup("tty", &volume).unwrap();
    let stat = tty.stat(&volume).unwrap();
    assert_eq!(stat.mode, DirEntryType::Char);
    assert_eq!(tty.devid(), 0x0501);
    volume.vput(tty).unwrap();

    assert_eq!(
        root.mknod("d", DirEntryType::Directory, 0, &volume),
        Err(Error::InvalidArgument)
    );

    root.unlink("tty", &volume).unwrap();
    drop(root);
    volume.unmount().unwrap();
}

#[test]
fn readdir_reports_tombstones() {
    let (_disk, volume) = fresh(64, 32);
    let root = volume.root();

    for name in ["a", "b", "c"] {
        let f = root.create(name, &volume).unwrap();
        volume.vput(f).unwrap();
    }
    root.unlink("b", &volume).unwrap();
    assert_eq!(names(&root, &volume), [".", "..", "a", "", "c"]);

    // 新目录项复用墓碑槽
    let f = root.create("d", &volume).unwrap();
    volume.vput(f).unwrap();
    assert_eq!(names(&root, &volume), [".", "..", "a", "d", "c"]);

    for name in ["a", "c", "d"] {
        root.unlink(name, &volume).unwrap();
    }
    drop(root);
    volume.unmount().unwrap();
}

#[test]
fn corrupt_entry_name_surfaces_error() {
    let (disk, volume) = fresh(64, 32);
    volume.unmount().unwrap();

    // 根目录数据块紧跟超级块与 inode 表；抹掉 "." 的 \0 结尾
    let mut block = vec![0; BLOCK_SIZE];
    disk.read_block(2, &mut block).unwrap();
    block[..28].fill(0xff);
    disk.write_block(2, &block).unwrap();

    let volume = SysvFileSystem::mount(disk).unwrap();
    let root = volume.root();
    assert_eq!(root.readdir(0, &volume).err(), Some(Error::Corrupted));
    assert_eq!(root.lookup("x", &volume).err(), Some(Error::Corrupted));

    // 卸载检查同样过不去，但以错误而非 panic 上报
    drop(root);
    assert_eq!(volume.unmount().unwrap_err(), Error::Fatal);
}

fn names(dir: &sysv_fs::Vnode, volume: &sysv_fs::SysvFileSystem) -> Vec<String> {
    let mut offset = 0;
    let mut found = Vec::new();
    while let Some((entry, next)) = dir.readdir(offset, volume).unwrap() {
        found.push(entry.name);
        offset = next;
    }
    found
}
