mod cli;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use clap::Parser;
use sysv_fs::{BLOCK_SIZE, SysvFileSystem};
use sysv_fs_fuse::BlockFile;
use typed_bytesize::ByteSizeIec;

use self::cli::Cli;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&cli.image)?;
    let bytes = cli.blocks as u64 * BLOCK_SIZE as u64;
    fd.set_len(bytes)?;
    println!(
        "image={} size={} inodes={}",
        cli.image.display(),
        ByteSizeIec(bytes),
        cli.inodes
    );

    let device = Arc::new(BlockFile(Mutex::new(fd)));
    let volume =
        SysvFileSystem::format(device, cli.blocks, cli.inodes).expect("formatting failed");
    let root = volume.root();

    if let Some(source) = &cli.source {
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry
                .file_name()
                .into_string()
                .expect("file name is not UTF-8");
            let mut data = Vec::new();
            File::open(entry.path())?.read_to_end(&mut data)?;

            log::info!("packing {name:?} ({} bytes)", data.len());
            let inode = root.create(&name, &volume).expect("create failed");
            inode.write_at(0, &data, &volume).expect("write failed");
            volume.vput(inode).expect("vput failed");
        }
    }

    volume.unmount().expect("unmount failed");
    Ok(())
}
