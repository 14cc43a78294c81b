//! Inspect subcommand - example archive summary

use anyhow::{Context, Result};
use scrub_core::ExampleArchive;
use std::path::PathBuf;

pub fn run(path: PathBuf) -> Result<()> {
    println!("\n=== Archive Info ===\n");

    let archive = ExampleArchive::load(&path).context("Failed to load archive")?;
    let (channels, height, width) = archive.image_dims();

    println!("  Path: {}", path.display());
    println!("  Examples: {}", archive.len());
    println!("  Image: {}x{}x{} (CHW)", channels, height, width);
    println!("  Classes: {}", archive.num_classes());

    let meta = std::fs::metadata(&path)?;
    let size_mb = meta.len() as f64 / (1024.0 * 1024.0);
    println!("  File size: {:.1} MB", size_mb);

    Ok(())
}
