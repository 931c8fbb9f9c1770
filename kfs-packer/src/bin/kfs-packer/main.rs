mod cli;

use std::io;
use std::sync::Arc;

use clap::Parser;
use cli::Cli;
use kfs::{BlockDevice, FileSystem, FormatOptions};
use kfs_packer::BlockFile;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    println!("source={:?}\nimage={:?}", cli.source, cli.image);

    let block_file: Arc<dyn BlockDevice> =
        Arc::new(BlockFile::create(&cli.image, cli.blocks as usize)?);

    let mut options = FormatOptions::new(cli.blocks);
    if let Some(inodes) = cli.inodes {
        options.max_inodes = inodes;
    }
    if let Some(indirect_blocks) = cli.indirect_blocks {
        options.max_indirect_blocks = indirect_blocks;
    }
    FileSystem::format(&block_file, options).map_err(io::Error::other)?;

    let fs = FileSystem::new();
    fs.mount(block_file, 0, 0).map_err(io::Error::other)?;
    let packed = kfs_packer::pack(&fs, &cli.source, "/")?;
    fs.unmount().map_err(io::Error::other)?;

    println!("{packed} files packed");
    Ok(())
}
