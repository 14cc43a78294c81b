//! 2D Batch Normalization with trainable running statistics
//!
//! Training mode normalizes with per-channel batch statistics and folds
//! them into the running buffers; eval mode normalizes with the buffers.
//! The buffers are layer-owned `Var`s surfaced through `buffers()` so
//! checkpoints can persist them without exposing them to the optimizer.

use candle_core::{ModuleT, Result, Tensor, Var};
use candle_nn::{Init, VarBuilder};

pub struct BatchNorm2d {
    weight: Tensor,
    bias: Tensor,
    running_mean: Var,
    running_var: Var,
}

impl BatchNorm2d {
    pub const EPS: f64 = 1e-5;
    pub const MOMENTUM: f64 = 0.1;

    pub fn new(num_features: usize, vb: VarBuilder) -> Result<Self> {
        let weight = vb.get_with_hints(num_features, "weight", Init::Const(1.0))?;
        let bias = vb.get_with_hints(num_features, "bias", Init::Const(0.0))?;
        let running_mean = Var::zeros(num_features, vb.dtype(), vb.device())?;
        let running_var = Var::ones(num_features, vb.dtype(), vb.device())?;
        Ok(Self {
            weight,
            bias,
            running_mean,
            running_var,
        })
    }

    /// Running statistics, keyed by their conventional names
    pub fn buffers(&self) -> Vec<(String, Var)> {
        vec![
            ("running_mean".to_string(), self.running_mean.clone()),
            ("running_var".to_string(), self.running_var.clone()),
        ]
    }
}

impl ModuleT for BatchNorm2d {
    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let (_n, c, _h, _w) = x.dims4()?;

        let (mean, var) = if train {
            let xt = x.transpose(0, 1)?.flatten_from(1)?;
            let count = xt.dim(1)?;
            if count <= 1 {
                candle_core::bail!("batch-norm training needs more than one value per channel");
            }
            let mean = xt.mean(1)?;
            let var = xt.broadcast_sub(&mean.unsqueeze(1)?)?.sqr()?.mean(1)?;

            // Running buffers take the unbiased variance, detached from the graph
            let unbiased = count as f64 / (count - 1) as f64;
            let new_mean = ((self.running_mean.as_tensor() * (1.0 - Self::MOMENTUM))?
                + (mean.detach() * Self::MOMENTUM)?)?;
            let new_var = ((self.running_var.as_tensor() * (1.0 - Self::MOMENTUM))?
                + ((var.detach() * unbiased)? * Self::MOMENTUM)?)?;
            self.running_mean.set(&new_mean)?;
            self.running_var.set(&new_var)?;

            (mean, var)
        } else {
            (
                self.running_mean.as_tensor().clone(),
                self.running_var.as_tensor().clone(),
            )
        };

        let mean = mean.reshape((1, c, 1, 1))?;
        let std = (var + Self::EPS)?.sqrt()?.reshape((1, c, 1, 1))?;
        let weight = self.weight.reshape((1, c, 1, 1))?;
        let bias = self.bias.reshape((1, c, 1, 1))?;

        x.broadcast_sub(&mean)?
            .broadcast_div(&std)?
            .broadcast_mul(&weight)?
            .broadcast_add(&bias)
    }
}
