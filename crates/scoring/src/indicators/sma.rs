/// Simple moving average of close prices.
///
/// Returns `None` until at least `period` values are available.
#[derive(Debug, Clone, Copy)]
pub struct Sma {
    pub period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self { period }
    }

    /// Mean of the last `period` closes (oldest first).
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        if closes.len() < self.period {
            return None;
        }
        let window = &closes[closes.len() - self.period..];
        Some(window.iter().sum::<f64>() / self.period as f64)
    }

    /// The last `count` SMA values, oldest first, `None` where undefined.
    pub fn series(&self, closes: &[f64], count: usize) -> Vec<Option<f64>> {
        let start = closes.len().saturating_sub(count);
        (start..closes.len())
            .map(|end| self.compute(&closes[..=end]))
            .collect()
    }
}
