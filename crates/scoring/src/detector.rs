use chrono::NaiveDate;
use tracing::debug;

use common::{PriceBar, ScoreSnapshot, Signal};

use crate::config::ScoringConfig;
use crate::features::extract_features;
use crate::score::calculate_score;

/// Slides the scorer over a symbol's history and emits deduplicated signals.
#[derive(Debug, Clone, Default)]
pub struct SignalDetector {
    config: ScoringConfig,
}

impl SignalDetector {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Chronological signals for `bars`.
    ///
    /// Days `warmup..len-1` are evaluated; the last bar is never a signal day
    /// because nothing after it could be measured. A candidate is dropped when
    /// an accepted signal lies fewer than `dedup_window_days` calendar days
    /// before it, so the earliest detection in a cluster wins.
    pub fn detect(&self, symbol: &str, bars: &[PriceBar]) -> Vec<Signal> {
        let threshold = self.config.detection_threshold;
        let mut accepted: Vec<Signal> = Vec::new();

        for i in self.config.warmup_bars..bars.len().saturating_sub(1) {
            let features = extract_features(&bars[..=i], &self.config);
            let score = calculate_score(&features);
            if score.value() < threshold {
                continue;
            }

            let bar = &bars[i];
            if let Some(prior) = self.suppressed_by(&accepted, bar.date) {
                debug!(
                    symbol,
                    date = %bar.date,
                    prior = %prior,
                    score = score.value(),
                    "Candidate suppressed by earlier signal"
                );
                continue;
            }

            debug!(symbol, date = %bar.date, score = score.value(), "Signal detected");
            accepted.push(Signal {
                symbol: symbol.to_string(),
                signal_date: bar.date,
                signal_price: bar.close,
                score,
                features,
            });
        }

        accepted
    }

    /// The score of every day from the end of warm-up through the last bar.
    pub fn daily_scores(&self, symbol: &str, bars: &[PriceBar]) -> Vec<ScoreSnapshot> {
        (self.config.warmup_bars..bars.len())
            .map(|i| {
                let features = extract_features(&bars[..=i], &self.config);
                ScoreSnapshot {
                    symbol: symbol.to_string(),
                    date: bars[i].date,
                    score: calculate_score(&features),
                    price: bars[i].close,
                    features,
                }
            })
            .collect()
    }

    fn suppressed_by(&self, accepted: &[Signal], date: NaiveDate) -> Option<NaiveDate> {
        accepted
            .iter()
            .map(|s| s.signal_date)
            .find(|&prior| {
                let days = (date - prior).num_days();
                (0..self.config.dedup_window_days).contains(&days)
            })
    }
}

/// Signals for `bars` with the default configuration.
pub fn detect_signals(symbol: &str, bars: &[PriceBar]) -> Vec<Signal> {
    SignalDetector::default().detect(symbol, bars)
}
