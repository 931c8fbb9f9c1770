use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Image file to create
    #[arg(long, short)]
    pub image: PathBuf,

    /// Image size in blocks
    #[arg(long, short, default_value_t = 16 * 2048)]
    pub blocks: u32,

    /// Inode table capacity, derived from the image size if absent
    #[arg(long)]
    pub inodes: Option<u32>,

    /// Indirect block table capacity, derived from the image size if absent
    #[arg(long)]
    pub indirect_blocks: Option<u32>,

    /// Host directory copied into the root directory
    #[arg(long, short)]
    pub source: PathBuf,
}
