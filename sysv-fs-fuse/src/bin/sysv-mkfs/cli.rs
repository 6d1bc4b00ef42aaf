use std::path::PathBuf;

use clap::Parser;

/// Create a sysv-fs image, optionally packing files into its root
#[derive(Parser)]
pub struct Cli {
    /// Image file to create
    pub image: PathBuf,

    /// Volume size in blocks
    #[arg(long, short, default_value_t = 4096)]
    pub blocks: u32,

    /// Number of inodes
    #[arg(long, short, default_value_t = 1024)]
    pub inodes: u32,

    /// Directory whose regular files are copied into the volume root
    #[arg(long, short)]
    pub source: Option<PathBuf>,
}
