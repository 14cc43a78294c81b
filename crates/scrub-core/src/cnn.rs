//! Compact convolutional classifier
//!
//! Two conv/norm blocks with 2x2 max pooling and a linear head over the
//! globally averaged features. Small enough for CPU smoke runs.

use candle_core::{Module, ModuleT, Result, Tensor, Var, D};
use candle_nn::{conv2d, linear, Conv2d, Conv2dConfig, Linear, VarBuilder};

use crate::norm::BatchNorm2d;
use crate::registry::Classifier;

pub struct CompactCnn {
    conv1: Conv2d,
    bn1: BatchNorm2d,
    conv2: Conv2d,
    bn2: BatchNorm2d,
    fc: Linear,
    num_classes: usize,
}

impl CompactCnn {
    pub fn new(num_classes: usize, vb: VarBuilder) -> Result<Self> {
        let cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        let conv1 = conv2d(3, 32, 3, cfg, vb.pp("conv1"))?;
        let bn1 = BatchNorm2d::new(32, vb.pp("bn1"))?;
        let conv2 = conv2d(32, 64, 3, cfg, vb.pp("conv2"))?;
        let bn2 = BatchNorm2d::new(64, vb.pp("bn2"))?;
        let fc = linear(64, num_classes, vb.pp("fc"))?;
        Ok(Self {
            conv1,
            bn1,
            conv2,
            bn2,
            fc,
            num_classes,
        })
    }
}

impl ModuleT for CompactCnn {
    fn forward_t(&self, images: &Tensor, train: bool) -> Result<Tensor> {
        let x = self.conv1.forward(images)?;
        let x = self.bn1.forward_t(&x, train)?.relu()?;
        let x = x.max_pool2d(2)?;
        let x = self.conv2.forward(&x)?;
        let x = self.bn2.forward_t(&x, train)?.relu()?;
        let x = x.max_pool2d(2)?;
        let x = x.mean(D::Minus1)?.mean(D::Minus1)?;
        self.fc.forward(&x)
    }
}

impl Classifier for CompactCnn {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn buffers(&self) -> Vec<(String, Var)> {
        let mut out = Vec::new();
        for (name, var) in self.bn1.buffers() {
            out.push((format!("bn1.{}", name), var));
        }
        for (name, var) in self.bn2.buffers() {
            out.push((format!("bn2.{}", name), var));
        }
        out
    }
}
