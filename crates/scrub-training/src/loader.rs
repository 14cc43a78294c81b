//! Batch assembly from example archives
//!
//! Training sources reshuffle per epoch, test sources keep file order.
//! Batches stage as f32 image tensors scaled to [0, 1] plus u32 label
//! rows on the run device.

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use rand::seq::SliceRandom;
use rand::thread_rng;
use scrub_core::ExampleArchive;

use crate::augment;

/// Per-example transform applied before staging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    None,
    Finetune,
}

pub struct Loader<'a> {
    archive: &'a ExampleArchive,
    batch_size: usize,
    shuffle: bool,
    transform: Transform,
    device: Device,
    order: Vec<usize>,
}

impl<'a> Loader<'a> {
    pub fn new(
        archive: &'a ExampleArchive,
        batch_size: usize,
        shuffle: bool,
        transform: Transform,
        device: Device,
    ) -> Result<Self> {
        if batch_size == 0 {
            anyhow::bail!("Batch size must be positive");
        }
        if archive.is_empty() {
            anyhow::bail!("Archive holds no examples");
        }
        Ok(Self {
            archive,
            batch_size,
            shuffle,
            transform,
            device,
            order: (0..archive.len()).collect(),
        })
    }

    pub fn num_examples(&self) -> usize {
        self.archive.len()
    }

    pub fn num_batches(&self) -> usize {
        (self.archive.len() + self.batch_size - 1) / self.batch_size
    }

    /// Reshuffle a shuffling loader; call at each epoch start
    pub fn begin_epoch(&mut self) {
        if self.shuffle {
            self.order.shuffle(&mut thread_rng());
        }
    }

    /// Stage batch `idx` as `(images, labels)`
    pub fn batch(&self, idx: usize) -> Result<(Tensor, Tensor)> {
        let start = idx * self.batch_size;
        let end = (start + self.batch_size).min(self.archive.len());
        if start >= end {
            anyhow::bail!("Batch {} out of range", idx);
        }

        let (c, h, w) = self.archive.image_dims();
        let count = end - start;
        let mut pixels = Vec::with_capacity(count * c * h * w);
        let mut labels = Vec::with_capacity(count);
        let mut rng = thread_rng();

        for &example_idx in &self.order[start..end] {
            let image = self
                .archive
                .image(example_idx)
                .context("Example index out of range")?;
            match self.transform {
                Transform::None => pixels.extend(image.iter().map(|&b| b as f32 / 255.0)),
                Transform::Finetune => {
                    let augmented = augment::finetune_example(image, c, h, w, &mut rng);
                    pixels.extend(augmented.iter().map(|&b| b as f32 / 255.0));
                }
            }
            labels.push(
                self.archive
                    .label(example_idx)
                    .context("Example index out of range")?,
            );
        }

        let images = Tensor::from_vec(pixels, (count, c, h, w), &self.device)?;
        let labels = Tensor::from_vec(labels, (count,), &self.device)?;
        Ok((images, labels))
    }
}
