use common::PriceBar;

/// Average Daily Range: mean of `(high - low) / low * 100` over the trailing
/// `period` bars. Bars with a non-positive low are ignored.
#[derive(Debug, Clone, Copy)]
pub struct Adr {
    pub period: usize,
}

impl Adr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ADR period must be >= 1");
        Self { period }
    }

    /// Returns `None` when no usable bar is in the window.
    pub fn compute(&self, bars: &[PriceBar]) -> Option<f64> {
        let window = &bars[bars.len().saturating_sub(self.period)..];
        let ranges: Vec<f64> = window
            .iter()
            .filter(|b| b.low > 0.0)
            .map(|b| (b.high - b.low) / b.low * 100.0)
            .collect();
        if ranges.is_empty() {
            return None;
        }
        Some(ranges.iter().sum::<f64>() / ranges.len() as f64)
    }
}

/// Mean volume of the trailing `period` bars, 0 for an empty slice.
pub fn average_volume(bars: &[PriceBar], period: usize) -> f64 {
    let window = &bars[bars.len().saturating_sub(period)..];
    if window.is_empty() {
        return 0.0;
    }
    window.iter().map(|b| b.volume).sum::<f64>() / window.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(high: f64, low: f64, volume: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: low,
            high,
            low,
            close: high,
            volume,
        }
    }

    #[test]
    fn adr_over_trailing_period() {
        let bars = vec![bar(200.0, 100.0, 1.0), bar(11.0, 10.0, 1.0), bar(12.0, 10.0, 1.0)];
        let adr = Adr::new(2).compute(&bars).unwrap();
        assert!((adr - 15.0).abs() < 1e-9, "got {adr}");
    }

    #[test]
    fn adr_none_without_usable_bars() {
        assert!(Adr::new(14).compute(&[]).is_none());
        assert!(Adr::new(14).compute(&[bar(1.0, 0.0, 1.0)]).is_none());
    }

    #[test]
    fn average_volume_uses_available_bars() {
        let bars = vec![bar(1.0, 1.0, 10.0), bar(1.0, 1.0, 30.0)];
        assert_eq!(average_volume(&bars, 20), 20.0);
        assert_eq!(average_volume(&bars, 1), 30.0);
        assert_eq!(average_volume(&[], 20), 0.0);
    }
}
