//! Checkpoint persistence
//!
//! One safetensors file per record: model parameters under their own
//! names, batch-norm running buffers alongside them, and optimizer
//! momentum under an `optim.` prefix. A JSON sidecar carries the epoch
//! summary. Pretrained inputs use the same plain-name layout, so a
//! produced record can be fed back through `load_model_state`.

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use scrub_core::Classifier;
use scrub_optimizer::Sgd;

/// Sidecar metadata written next to each checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub clean_acc: f64,
    pub bad_acc: f64,
    pub learning_rate: f64,
}

pub struct CheckpointWriter {
    dir: PathBuf,
    model_name: String,
}

impl CheckpointWriter {
    pub fn new(dir: &Path, model_name: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create checkpoint directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            model_name: model_name.to_string(),
        })
    }

    /// Tensor file for one unlearning epoch
    pub fn record_path(&self, epoch: usize) -> PathBuf {
        self.dir
            .join(format!("{}-unlearning_epochs{}.safetensors", self.model_name, epoch))
    }

    fn sidecar_path(&self, epoch: usize) -> PathBuf {
        self.dir
            .join(format!("{}-unlearning_epochs{}.json", self.model_name, epoch))
    }

    /// Persist model params, norm buffers, and optimizer momentum
    pub fn save(
        &self,
        varmap: &VarMap,
        model: &dyn Classifier,
        optimizer: &Sgd,
        meta: &CheckpointMeta,
    ) -> Result<()> {
        let mut tensors: HashMap<String, Tensor> = HashMap::new();
        for (name, var) in varmap.data().lock().unwrap().iter() {
            tensors.insert(name.clone(), var.as_tensor().clone());
        }
        for (name, var) in model.buffers() {
            tensors.insert(name, var.as_tensor().clone());
        }
        for (name, tensor) in optimizer.state_tensors() {
            tensors.insert(format!("optim.{}", name), tensor);
        }

        let path = self.record_path(meta.epoch);
        candle_core::safetensors::save(&tensors, &path)
            .with_context(|| format!("Failed to write checkpoint {}", path.display()))?;

        let sidecar = self.sidecar_path(meta.epoch);
        std::fs::write(&sidecar, serde_json::to_string_pretty(meta)?)
            .with_context(|| format!("Failed to write checkpoint metadata {}", sidecar.display()))?;

        tracing::info!("Saved epoch {} checkpoint to {}", meta.epoch, path.display());
        Ok(())
    }
}

/// Load model params and norm buffers from a checkpoint (or a pretrained
/// file with the same layout) into a live model
pub fn load_model_state(
    path: &Path,
    varmap: &mut VarMap,
    model: &dyn Classifier,
    device: &Device,
) -> Result<()> {
    varmap
        .load(path)
        .with_context(|| format!("Failed to load model parameters from {}", path.display()))?;

    let tensors = candle_core::safetensors::load(path, device)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    for (name, var) in model.buffers() {
        let tensor = tensors
            .get(&name)
            .with_context(|| format!("Checkpoint {} is missing buffer {}", path.display(), name))?;
        var.set(tensor)?;
    }
    Ok(())
}
