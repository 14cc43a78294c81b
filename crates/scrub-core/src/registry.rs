//! Classifier seam and the architecture name table
//!
//! The training passes only need logits and the class count; parameter
//! state stays in the caller's VarMap. Running statistics are exposed
//! separately so checkpoints can carry them.

use candle_core::{ModuleT, Var};
use candle_nn::VarBuilder;

use crate::cnn::CompactCnn;
use crate::wrn::WideResNet;

/// Capability the unlearning passes require from a model
pub trait Classifier: ModuleT {
    fn num_classes(&self) -> usize;

    /// Batch-norm running statistics keyed by dotted parameter-style names
    fn buffers(&self) -> Vec<(String, Var)>;
}

/// Architecture names understood by `build`
pub const ARCHITECTURES: &[&str] = &["wrn-16-1", "wrn-16-2", "wrn-40-1", "wrn-40-2", "cnn"];

/// Resolve an architecture name to a freshly initialized classifier
pub fn build(name: &str, num_classes: usize, vb: VarBuilder) -> anyhow::Result<Box<dyn Classifier>> {
    let model: Box<dyn Classifier> = match name {
        "wrn-16-1" => Box::new(WideResNet::new(16, 1, num_classes, vb)?),
        "wrn-16-2" => Box::new(WideResNet::new(16, 2, num_classes, vb)?),
        "wrn-40-1" => Box::new(WideResNet::new(40, 1, num_classes, vb)?),
        "wrn-40-2" => Box::new(WideResNet::new(40, 2, num_classes, vb)?),
        "cnn" => Box::new(CompactCnn::new(num_classes, vb)?),
        other => anyhow::bail!(
            "Unknown architecture '{}' (expected one of: {})",
            other,
            ARCHITECTURES.join(", ")
        ),
    };
    Ok(model)
}
