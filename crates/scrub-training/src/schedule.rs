//! Per-epoch learning rate policies for the two phases
//!
//! Plain step functions of the epoch index, applied by overwriting the
//! optimizer rate before the epoch's first batch.

use scrub_optimizer::Sgd;

/// Finetuning rate: the initial rate for the first 40 epochs, then two
/// fixed decay steps
pub fn finetune_rate(epoch: usize, init: f64) -> f64 {
    if epoch < 40 {
        init
    } else if epoch < 60 {
        0.01
    } else {
        0.001
    }
}

/// Unlearning rate: one value inside the configured span, a lower one
/// past its end
pub fn unlearn_rate(epoch: usize, total_epochs: usize) -> f64 {
    if epoch < total_epochs {
        0.0005
    } else {
        0.0001
    }
}

/// Overwrite the optimizer rate and announce it on the console
pub fn apply(optimizer: &mut Sgd, lr: f64, epoch: usize) {
    optimizer.set_learning_rate(lr);
    println!("epoch: {}  lr: {:.4}", epoch, lr);
}
