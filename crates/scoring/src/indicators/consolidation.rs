use common::PriceBar;

/// Shape of the trailing consolidation window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConsolidationStats {
    /// Depth of the last close below the window's highest high.
    pub pullback_pct: f64,
    /// How much lighter second-half volume is than first-half volume.
    pub volume_decline_pct: f64,
    /// Second-half high/low range is narrower than the first half's.
    pub range_tightening: bool,
}

/// Consolidation analysis over the trailing `lookback` bars.
///
/// The window is split at `len / 2`; the second half takes the extra bar
/// when the length is odd. Windows shorter than `min_bars` report neutral
/// stats.
#[derive(Debug, Clone, Copy)]
pub struct Consolidation {
    pub lookback: usize,
    pub min_bars: usize,
}

impl Consolidation {
    pub fn new(lookback: usize, min_bars: usize) -> Self {
        Self { lookback, min_bars }
    }

    pub fn analyze(&self, bars: &[PriceBar]) -> ConsolidationStats {
        let window = trailing(bars, self.lookback);
        if window.len() < self.min_bars.max(2) {
            return ConsolidationStats::default();
        }
        let Some(close) = window.last().map(|b| b.close) else {
            return ConsolidationStats::default();
        };

        let resistance = max_high(window);
        let pullback_pct = if resistance > 0.0 {
            (resistance - close) / resistance * 100.0
        } else {
            0.0
        };

        let (first, second) = window.split_at(window.len() / 2);

        let first_volume = mean_volume(first);
        let volume_decline_pct = if first_volume > 0.0 {
            (first_volume - mean_volume(second)) / first_volume * 100.0
        } else {
            0.0
        };

        ConsolidationStats {
            pullback_pct,
            volume_decline_pct,
            range_tightening: range(second) < range(first),
        }
    }
}

/// Percent the last close must rise to reach the highest high of the
/// trailing `lookback` bars. 0 for an empty window or a zero close.
pub fn distance_to_breakout_pct(bars: &[PriceBar], lookback: usize) -> f64 {
    let window = trailing(bars, lookback);
    match window.last() {
        Some(last) if last.close != 0.0 => (max_high(window) - last.close) / last.close * 100.0,
        _ => 0.0,
    }
}

fn trailing(bars: &[PriceBar], lookback: usize) -> &[PriceBar] {
    &bars[bars.len().saturating_sub(lookback)..]
}

fn max_high(bars: &[PriceBar]) -> f64 {
    bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max)
}

fn min_low(bars: &[PriceBar]) -> f64 {
    bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min)
}

fn range(bars: &[PriceBar]) -> f64 {
    max_high(bars) - min_low(bars)
}

fn mean_volume(bars: &[PriceBar]) -> f64 {
    bars.iter().map(|b| b.volume).sum::<f64>() / bars.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn bars(rows: &[(f64, f64, f64, f64)]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        rows.iter()
            .enumerate()
            .map(|(i, &(high, low, close, volume))| PriceBar {
                date: start + Duration::days(i as i64),
                open: close,
                high,
                low,
                close,
                volume,
            })
            .collect()
    }

    #[test]
    fn short_window_reports_neutral_stats() {
        let b = bars(&[(11.0, 9.0, 10.0, 100.0); 9]);
        assert_eq!(Consolidation::new(20, 10).analyze(&b), ConsolidationStats::default());
    }

    #[test]
    fn volume_drying_up_and_range_narrowing() {
        let mut rows = vec![(12.0, 8.0, 10.0, 200.0); 10];
        rows.extend(vec![(10.5, 9.5, 10.0, 50.0); 10]);
        let stats = Consolidation::new(20, 10).analyze(&bars(&rows));
        assert_eq!(stats.volume_decline_pct, 75.0);
        assert!(stats.range_tightening);
        // highest high 12, close 10
        assert!((stats.pullback_pct - 2.0 / 12.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn odd_window_gives_remainder_to_second_half() {
        // 11 bars: first half 5 bars at volume 100, second half 6 bars at 40.
        let mut rows = vec![(11.0, 9.0, 10.0, 100.0); 5];
        rows.extend(vec![(11.0, 9.0, 10.0, 40.0); 6]);
        let stats = Consolidation::new(20, 10).analyze(&bars(&rows));
        assert_eq!(stats.volume_decline_pct, 60.0);
        assert!(!stats.range_tightening);
    }

    #[test]
    fn zero_first_half_volume_is_degenerate() {
        let mut rows = vec![(11.0, 9.0, 10.0, 0.0); 10];
        rows.extend(vec![(11.0, 9.0, 10.0, 500.0); 10]);
        let stats = Consolidation::new(20, 10).analyze(&bars(&rows));
        assert_eq!(stats.volume_decline_pct, 0.0);
    }

    #[test]
    fn only_trailing_lookback_is_considered() {
        let mut rows = vec![(50.0, 1.0, 10.0, 100.0); 5];
        rows.extend(vec![(11.0, 9.0, 10.0, 100.0); 20]);
        let b = bars(&rows);
        let stats = Consolidation::new(20, 10).analyze(&b);
        assert!((stats.pullback_pct - 1.0 / 11.0 * 100.0).abs() < 1e-9);
        assert!((distance_to_breakout_pct(&b, 20) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn distance_guards_zero_close() {
        let b = bars(&[(1.0, 0.0, 0.0, 10.0)]);
        assert_eq!(distance_to_breakout_pct(&b, 20), 0.0);
        assert_eq!(distance_to_breakout_pct(&[], 20), 0.0);
    }
}
