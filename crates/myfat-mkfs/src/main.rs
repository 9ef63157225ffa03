use anyhow::{bail, Result};
use clap::Parser;
use myfat_fs::fs::FormatOptions;
use myfat_fs::{FileBlockDevice, FileSystem, BLOCK_SIZE};
use std::path::PathBuf;

const BLOCKS_PER_MIB: u32 = (1024 * 1024 / BLOCK_SIZE) as u32;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Path to the disk image
    #[arg(short, long)]
    image: PathBuf,

    /// Image size in MiB (1 to 64)
    #[arg(short, long, default_value_t = 64)]
    size_mib: u32,

    /// Volume label (15 bytes at most)
    #[arg(short, long, default_value = "MYVOLUME")]
    label: String,

    /// Overwrite an existing image
    #[arg(short, long)]
    force: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if !(1..=64).contains(&cli.size_mib) {
        bail!("image size must be between 1 and 64 MiB");
    }
    if cli.image.exists() && !cli.force {
        bail!(
            "'{}' already exists (use --force to overwrite)",
            cli.image.display()
        );
    }

    let total_blocks = cli.size_mib * BLOCKS_PER_MIB;
    println!(
        "Creating '{}' ({} MiB, {} blocks)...",
        cli.image.display(),
        cli.size_mib,
        total_blocks
    );
    let mut device = FileBlockDevice::create(&cli.image, total_blocks)?;

    let options = FormatOptions {
        total_blocks,
        volume_label: cli.label,
    };
    FileSystem::format(&mut device, &options)?;

    println!("Format complete.");
    Ok(())
}
