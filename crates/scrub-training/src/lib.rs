//! Scrub Training - Two-Phase Backdoor Unlearning
//!
//! Finetuning on the suspected-clean split, gradient ascent on the
//! isolated split, with dual evaluation against a clean and a triggered
//! test set after every epoch

pub mod accuracy;
pub mod augment;
pub mod checkpoint;
pub mod config;
pub mod loader;
pub mod meter;
pub mod progress;
pub mod runner;
pub mod schedule;
pub mod trainer;

pub use config::RunConfig;
pub use loader::{Loader, Transform};
pub use meter::Meter;
pub use progress::ProgressLog;
pub use runner::{evaluate, train_epoch, Direction, PassStats};
pub use trainer::{Sources, Trainer};

/// Scrub training version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
