//! Wide Residual Network (WRN-d-k) for small-image classification
//!
//! Pre-activation basic blocks in three groups of widths 16k/32k/64k with
//! strides 1/2/2; depth d gives (d - 4) / 6 blocks per group.

use candle_core::{Module, ModuleT, Result, Tensor, Var, D};
use candle_nn::{conv2d_no_bias, linear, Conv2d, Conv2dConfig, Linear, VarBuilder};

use crate::norm::BatchNorm2d;
use crate::registry::Classifier;

fn conv3x3(in_c: usize, out_c: usize, stride: usize, vb: VarBuilder) -> Result<Conv2d> {
    let cfg = Conv2dConfig {
        padding: 1,
        stride,
        ..Default::default()
    };
    conv2d_no_bias(in_c, out_c, 3, cfg, vb)
}

fn conv1x1(in_c: usize, out_c: usize, stride: usize, vb: VarBuilder) -> Result<Conv2d> {
    let cfg = Conv2dConfig {
        stride,
        ..Default::default()
    };
    conv2d_no_bias(in_c, out_c, 1, cfg, vb)
}

struct BasicBlock {
    bn1: BatchNorm2d,
    conv1: Conv2d,
    bn2: BatchNorm2d,
    conv2: Conv2d,
    shortcut: Option<Conv2d>,
}

impl BasicBlock {
    fn new(in_c: usize, out_c: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        let bn1 = BatchNorm2d::new(in_c, vb.pp("bn1"))?;
        let conv1 = conv3x3(in_c, out_c, stride, vb.pp("conv1"))?;
        let bn2 = BatchNorm2d::new(out_c, vb.pp("bn2"))?;
        let conv2 = conv3x3(out_c, out_c, 1, vb.pp("conv2"))?;
        let shortcut = if in_c == out_c && stride == 1 {
            None
        } else {
            Some(conv1x1(in_c, out_c, stride, vb.pp("shortcut"))?)
        };
        Ok(Self {
            bn1,
            conv1,
            bn2,
            conv2,
            shortcut,
        })
    }

    fn forward(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let pre = self.bn1.forward_t(x, train)?.relu()?;
        // The projection shortcut taps the pre-activation, the identity taps x
        let residual = match &self.shortcut {
            Some(proj) => proj.forward(&pre)?,
            None => x.clone(),
        };
        let out = self.conv1.forward(&pre)?;
        let out = self.bn2.forward_t(&out, train)?.relu()?;
        let out = self.conv2.forward(&out)?;
        residual.add(&out)
    }

    fn buffers(&self, prefix: &str) -> Vec<(String, Var)> {
        let mut out = Vec::new();
        for (name, var) in self.bn1.buffers() {
            out.push((format!("{}.bn1.{}", prefix, name), var));
        }
        for (name, var) in self.bn2.buffers() {
            out.push((format!("{}.bn2.{}", prefix, name), var));
        }
        out
    }
}

struct Group {
    blocks: Vec<BasicBlock>,
}

impl Group {
    fn new(n: usize, in_c: usize, out_c: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        let mut blocks = Vec::with_capacity(n);
        for i in 0..n {
            let (block_in, block_stride) = if i == 0 { (in_c, stride) } else { (out_c, 1) };
            blocks.push(BasicBlock::new(
                block_in,
                out_c,
                block_stride,
                vb.pp(&format!("block{}", i)),
            )?);
        }
        Ok(Self { blocks })
    }

    fn forward(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let mut out = x.clone();
        for block in &self.blocks {
            out = block.forward(&out, train)?;
        }
        Ok(out)
    }

    fn buffers(&self, prefix: &str) -> Vec<(String, Var)> {
        let mut out = Vec::new();
        for (i, block) in self.blocks.iter().enumerate() {
            out.extend(block.buffers(&format!("{}.block{}", prefix, i)));
        }
        out
    }
}

pub struct WideResNet {
    conv1: Conv2d,
    group1: Group,
    group2: Group,
    group3: Group,
    bn: BatchNorm2d,
    fc: Linear,
    num_classes: usize,
}

impl WideResNet {
    pub fn new(depth: usize, widen: usize, num_classes: usize, vb: VarBuilder) -> Result<Self> {
        if depth < 10 || (depth - 4) % 6 != 0 {
            candle_core::bail!("WRN depth must be of the form 6n+4, got {}", depth);
        }
        let n = (depth - 4) / 6;
        let widths = [16, 16 * widen, 32 * widen, 64 * widen];

        let conv1 = conv3x3(3, widths[0], 1, vb.pp("conv1"))?;
        let group1 = Group::new(n, widths[0], widths[1], 1, vb.pp("group1"))?;
        let group2 = Group::new(n, widths[1], widths[2], 2, vb.pp("group2"))?;
        let group3 = Group::new(n, widths[2], widths[3], 2, vb.pp("group3"))?;
        let bn = BatchNorm2d::new(widths[3], vb.pp("bn"))?;
        let fc = linear(widths[3], num_classes, vb.pp("fc"))?;

        Ok(Self {
            conv1,
            group1,
            group2,
            group3,
            bn,
            fc,
            num_classes,
        })
    }
}

impl ModuleT for WideResNet {
    fn forward_t(&self, images: &Tensor, train: bool) -> Result<Tensor> {
        let x = self.conv1.forward(images)?;
        let x = self.group1.forward(&x, train)?;
        let x = self.group2.forward(&x, train)?;
        let x = self.group3.forward(&x, train)?;
        let x = self.bn.forward_t(&x, train)?.relu()?;
        // Global average pool over the spatial dims
        let x = x.mean(D::Minus1)?.mean(D::Minus1)?;
        self.fc.forward(&x)
    }
}

impl Classifier for WideResNet {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn buffers(&self) -> Vec<(String, Var)> {
        let mut out = Vec::new();
        out.extend(self.group1.buffers("group1"));
        out.extend(self.group2.buffers("group2"));
        out.extend(self.group3.buffers("group3"));
        for (name, var) in self.bn.buffers() {
            out.push((format!("bn.{}", name), var));
        }
        out
    }
}
