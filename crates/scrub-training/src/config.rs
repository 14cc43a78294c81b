//! Run configuration
//!
//! One immutable description of a two-phase run, built once at startup
//! and passed by reference into the orchestrator. Path helpers encode
//! the artifact naming templates the isolation stage writes.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Run on CUDA device 0; unavailability is fatal, never a CPU fallback
    pub cuda: bool,
    /// Architecture key understood by the model registry
    pub model: String,
    pub num_classes: usize,
    /// Pretrained (backdoored) model state, safetensors layout
    pub pretrained: PathBuf,
    pub batch_size: usize,
    /// Within-epoch console update granularity in batches; 0 silences
    pub print_freq: usize,

    /// Initial rate of the finetuning schedule (unlearning rates are fixed)
    pub lr_finetune_init: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub nesterov: bool,

    pub finetune: bool,
    pub finetune_epochs: usize,
    pub unlearning_epochs: usize,
    /// Checkpoint every this many unlearning epochs
    pub interval: usize,
    pub save: bool,

    /// Fraction of the training set the isolation stage split off
    pub isolation_ratio: f64,
    pub isolate_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub log_dir: PathBuf,
    pub test_clean: PathBuf,
    pub test_bad: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cuda: false,
            model: "wrn-16-1".to_string(),
            num_classes: 10,
            pretrained: PathBuf::from("weight/pretrained.safetensors"),
            batch_size: 64,
            print_freq: 100,
            lr_finetune_init: 0.1,
            momentum: 0.9,
            weight_decay: 1e-4,
            nesterov: true,
            finetune: true,
            finetune_epochs: 60,
            unlearning_epochs: 20,
            interval: 5,
            save: true,
            isolation_ratio: 0.01,
            isolate_dir: PathBuf::from("isolation"),
            checkpoint_dir: PathBuf::from("weight/ABL_results"),
            log_dir: PathBuf::from("logs"),
            test_clean: PathBuf::from("data/test-clean.bin"),
            test_bad: PathBuf::from("data/test-bad.bin"),
        }
    }
}

impl RunConfig {
    /// Reject configurations no run could make sense of
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("Batch size must be positive");
        }
        if self.num_classes < 2 {
            anyhow::bail!("Need at least two classes, got {}", self.num_classes);
        }
        if self.unlearning_epochs == 0 {
            anyhow::bail!("Unlearning needs at least the baseline epoch");
        }
        if self.finetune && self.finetune_epochs == 0 {
            anyhow::bail!("Finetuning is enabled with zero epochs");
        }
        if self.save && self.interval == 0 {
            anyhow::bail!("Checkpoint interval must be positive when saving");
        }
        if !(self.isolation_ratio > 0.0 && self.isolation_ratio < 1.0) {
            anyhow::bail!(
                "Isolation ratio must lie strictly between 0 and 1, got {}",
                self.isolation_ratio
            );
        }
        Ok(())
    }

    fn isolation_pct(&self) -> u32 {
        (self.isolation_ratio * 100.0).round() as u32
    }

    /// Suspected-poisoned split, e.g. `wrn-16-1-isolation1%-examples.bin`
    pub fn isolation_archive(&self) -> PathBuf {
        self.isolate_dir.join(format!(
            "{}-isolation{}%-examples.bin",
            self.model,
            self.isolation_pct()
        ))
    }

    /// Suspected-clean remainder, e.g. `wrn-16-1-other99%-examples.bin`
    pub fn other_archive(&self) -> PathBuf {
        self.isolate_dir.join(format!(
            "{}-other{}%-examples.bin",
            self.model,
            100 - self.isolation_pct()
        ))
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join("ABL_unlearning.csv")
    }
}
