use std::collections::BTreeMap;

use tracing::trace;

use common::{round_to, PerformanceRecord, PriceBar, Signal};

/// Measures forward returns of a signal at fixed trading-day horizons.
#[derive(Debug, Clone)]
pub struct PerformanceMeasurer {
    horizons: Vec<u32>,
}

impl Default for PerformanceMeasurer {
    fn default() -> Self {
        Self::new(vec![1, 5, 20, 30])
    }
}

impl PerformanceMeasurer {
    pub fn new(horizons: Vec<u32>) -> Self {
        Self { horizons }
    }

    /// One record per horizon that has at least `h` bars after the signal
    /// date. Horizons without enough future data are absent.
    ///
    /// Return is close-to-close against `signal_price`; max gain and max
    /// drawdown use the highest high and lowest low from the first future
    /// bar through the exit bar.
    pub fn measure(&self, signal: &Signal, bars: &[PriceBar]) -> BTreeMap<u32, PerformanceRecord> {
        let first_future = bars.partition_point(|b| b.date <= signal.signal_date);
        let future = &bars[first_future..];
        let entry = signal.signal_price;

        let mut records = BTreeMap::new();
        for &horizon in &self.horizons {
            let h = horizon as usize;
            if h == 0 || future.len() < h {
                trace!(
                    symbol = %signal.symbol,
                    date = %signal.signal_date,
                    horizon,
                    available = future.len(),
                    "Horizon out of reach"
                );
                continue;
            }

            let exit_index = (h - 1).min(future.len() - 1);
            let held = &future[..=exit_index];
            let exit = &held[exit_index];

            let max_high = held.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let min_low = held.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);

            records.insert(
                horizon,
                PerformanceRecord {
                    symbol: signal.symbol.clone(),
                    signal_date: signal.signal_date,
                    horizon_days: horizon,
                    exit_date: exit.date,
                    exit_price: round_to(exit.close, 2),
                    return_pct: round_to(pct_change(entry, exit.close), 2),
                    max_gain_pct: round_to(pct_change(entry, max_high), 2),
                    max_drawdown_pct: round_to(pct_change(entry, min_low), 2),
                },
            );
        }
        records
    }
}

/// Performance at the default horizons {1, 5, 20, 30}.
pub fn measure_performance(signal: &Signal, bars: &[PriceBar]) -> BTreeMap<u32, PerformanceRecord> {
    PerformanceMeasurer::default().measure(signal, bars)
}

fn pct_change(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        return 0.0;
    }
    (to - from) / from * 100.0
}
