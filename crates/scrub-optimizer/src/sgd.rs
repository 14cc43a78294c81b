//! SGD with momentum, Nesterov lookahead, and weight decay
//!
//! Update order: decay folds into the gradient, the momentum buffer
//! accumulates, Nesterov adds one lookahead term, then the parameter
//! steps against the final gradient. Buffers start at zero, which makes
//! the first momentum step equal to the raw gradient.

use candle_core::backprop::GradStore;
use candle_core::{Result, Tensor, Var};
use candle_nn::VarMap;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct ParamsSgd {
    pub lr: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub nesterov: bool,
}

impl Default for ParamsSgd {
    fn default() -> Self {
        Self {
            lr: 0.1,
            momentum: 0.9,
            weight_decay: 1e-4,
            nesterov: true,
        }
    }
}

struct ParamState {
    name: String,
    var: Var,
    buffer: Tensor,
}

pub struct Sgd {
    params: ParamsSgd,
    state: Vec<ParamState>,
}

impl Sgd {
    /// Build from every trainable var in the map, name-sorted so the
    /// state order is stable across runs
    pub fn from_varmap(varmap: &VarMap, params: ParamsSgd) -> Result<Self> {
        let mut named: Vec<(String, Var)> = varmap
            .data()
            .lock()
            .unwrap()
            .iter()
            .map(|(name, var)| (name.clone(), var.clone()))
            .collect();
        named.sort_by(|a, b| a.0.cmp(&b.0));

        let mut state = Vec::with_capacity(named.len());
        for (name, var) in named {
            let buffer = Tensor::zeros_like(var.as_tensor())?;
            state.push(ParamState { name, var, buffer });
        }
        Ok(Self { params, state })
    }

    /// Apply one update from computed gradients; params the graph never
    /// touched have no gradient and are left alone
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        for ps in self.state.iter_mut() {
            if let Some(grad) = grads.get(ps.var.as_tensor()) {
                let mut g = grad.clone();
                if self.params.weight_decay != 0.0 {
                    g = (g + (ps.var.as_tensor() * self.params.weight_decay)?)?;
                }
                if self.params.momentum != 0.0 {
                    ps.buffer = ((&ps.buffer * self.params.momentum)? + &g)?;
                    g = if self.params.nesterov {
                        (g + (&ps.buffer * self.params.momentum)?)?
                    } else {
                        ps.buffer.clone()
                    };
                }
                ps.var.set(&ps.var.sub(&(g * self.params.lr)?)?)?;
            }
        }
        Ok(())
    }

    /// Backprop the loss and apply one update
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = loss.backward()?;
        self.step(&grads)
    }

    pub fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    pub fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr;
    }

    pub fn params(&self) -> &ParamsSgd {
        &self.params
    }

    /// Momentum buffers keyed by parameter name, for checkpointing
    pub fn state_tensors(&self) -> Vec<(String, Tensor)> {
        self.state
            .iter()
            .map(|ps| (format!("{}.momentum", ps.name), ps.buffer.clone()))
            .collect()
    }

    /// Restore momentum buffers saved by `state_tensors`; a missing
    /// buffer means the checkpoint does not match this model
    pub fn load_state(&mut self, tensors: &HashMap<String, Tensor>) -> Result<()> {
        for ps in self.state.iter_mut() {
            let key = format!("{}.momentum", ps.name);
            match tensors.get(&key) {
                Some(buffer) => ps.buffer = buffer.clone(),
                None => candle_core::bail!("Missing optimizer state tensor {}", key),
            }
        }
        Ok(())
    }
}
