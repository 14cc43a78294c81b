//! Scrub Optimizer - Momentum SGD
//!
//! Classical SGD with momentum, Nesterov lookahead, and L2 weight decay,
//! driving every trainable var of a candle VarMap

pub mod sgd;

pub use sgd::{ParamsSgd, Sgd};

/// Scrub optimizer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
