//! Weighted running averages for per-pass metrics

/// Tracks the latest value and the weighted mean of a series
#[derive(Debug, Clone, Default)]
pub struct Meter {
    last: f64,
    sum: f64,
    count: f64,
}

impl Meter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in `value` observed over `weight` items; a zero-weight update
    /// only refreshes the latest value
    pub fn update(&mut self, value: f64, weight: usize) {
        self.last = value;
        self.sum += value * weight as f64;
        self.count += weight as f64;
    }

    /// Latest observed value
    pub fn value(&self) -> f64 {
        self.last
    }

    /// Weighted mean of everything folded in so far; zero before any update
    pub fn avg(&self) -> f64 {
        if self.count > 0.0 {
            self.sum / self.count
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_average() {
        let mut meter = Meter::new();
        meter.update(1.0, 2);
        meter.update(4.0, 1);

        // (1 * 2 + 4 * 1) / 3
        assert!((meter.avg() - 2.0).abs() < 1e-12);
        assert!((meter.value() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_weight_refreshes_value_only() {
        let mut meter = Meter::new();
        meter.update(3.0, 4);
        meter.update(9.0, 0);

        assert!((meter.value() - 9.0).abs() < 1e-12);
        assert!((meter.avg() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_fresh_meter_averages_to_zero() {
        let meter = Meter::new();
        assert_eq!(meter.avg(), 0.0);
        assert_eq!(meter.value(), 0.0);
    }

    #[test]
    fn test_reset() {
        let mut meter = Meter::new();
        meter.update(5.0, 10);
        meter.reset();

        assert_eq!(meter.avg(), 0.0);
        assert_eq!(meter.value(), 0.0);
    }
}
