//! Unlearning progress log
//!
//! Append-only CSV with one row per evaluated epoch and a fixed column
//! set. The header is written once, when the file is first created.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const COLUMNS: &str = "Epoch,Test_clean_acc,Test_bad_acc,Test_clean_loss,Test_bad_loss";

pub struct ProgressLog {
    path: PathBuf,
}

impl ProgressLog {
    /// Open the log, creating directories and the header as needed
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory {}", parent.display())
                })?;
            }
        }
        if !path.exists() {
            std::fs::write(path, format!("{}\n", COLUMNS))
                .with_context(|| format!("Failed to create progress log {}", path.display()))?;
            tracing::debug!("Created progress log at {}", path.display());
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Append one evaluated-epoch row
    pub fn append(
        &self,
        epoch: usize,
        clean_acc: f64,
        bad_acc: f64,
        clean_loss: f64,
        bad_loss: f64,
    ) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open progress log {}", self.path.display()))?;
        writeln!(
            file,
            "{},{},{},{},{}",
            epoch, clean_acc, bad_acc, clean_loss, bad_loss
        )?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
