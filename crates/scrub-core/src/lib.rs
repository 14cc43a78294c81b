//! Scrub Core - Classifiers and Example Archives
//!
//! Image classifiers built on Hugging Face Candle plus the binary
//! archive format the unlearning pipeline reads its example sets from

pub mod archive;
pub mod cnn;
pub mod norm;
pub mod registry;
pub mod wrn;

pub use archive::{ArchiveBuilder, ArchiveHeader, ExampleArchive};
pub use cnn::CompactCnn;
pub use norm::BatchNorm2d;
pub use registry::{build, Classifier, ARCHITECTURES};
pub use wrn::WideResNet;

/// Scrub version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
