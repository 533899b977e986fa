use common::{Error, FeatureSet, PriceBar, Result, Score};

use crate::config::ScoringConfig;
use crate::features::extract_features;

// ─── Point table ──────────────────────────────────────────────────────────────

/// `(threshold, points)`; tiers are cumulative.
const PRIOR_MOVE_TIERS: [(f64, i32); 3] = [(30.0, 15), (50.0, 5), (75.0, 5)];
const PULLBACK_TIERS: [(f64, i32); 3] = [(25.0, 8), (15.0, 4), (10.0, 3)];
const VOLUME_DECLINE_TIERS: [(f64, i32); 3] = [(20.0, 5), (40.0, 5), (60.0, 5)];
const DISTANCE_TIERS: [(f64, i32); 2] = [(5.0, 5), (2.0, 5)];

const FAST_SLOPE_POINTS: i32 = 10;
const SLOW_SLOPE_POINTS: i32 = 5;
const FAST_OVER_SLOW_POINTS: i32 = 5;
const TIGHTENING_POINTS: i32 = 10;
const ABOVE_FAST_POINTS: i32 = 3;
const ABOVE_SLOW_POINTS: i32 = 2;

fn at_least(value: f64, tiers: &[(f64, i32)]) -> i32 {
    tiers.iter().filter(|(t, _)| value >= *t).map(|(_, p)| p).sum()
}

fn at_most(value: f64, tiers: &[(f64, i32)]) -> i32 {
    tiers.iter().filter(|(t, _)| value <= *t).map(|(_, p)| p).sum()
}

fn when(cond: bool, points: i32) -> i32 {
    if cond {
        points
    } else {
        0
    }
}

/// Apply the additive point table to a feature set.
///
/// Total: NaN features simply earn no points for their criterion.
pub fn calculate_score(f: &FeatureSet) -> Score {
    let raw = at_least(f.prior_move_pct, &PRIOR_MOVE_TIERS)
        + when(f.sma_fast_slope > 0.0, FAST_SLOPE_POINTS)
        + when(f.sma_slow_slope > 0.0, SLOW_SLOPE_POINTS)
        + when(
            f.sma_fast_slope > f.sma_slow_slope && f.sma_slow_slope > 0.0,
            FAST_OVER_SLOW_POINTS,
        )
        + at_most(f.pullback_pct, &PULLBACK_TIERS)
        + at_least(f.volume_decline_pct, &VOLUME_DECLINE_TIERS)
        + when(f.range_tightening, TIGHTENING_POINTS)
        + at_most(f.distance_to_breakout_pct, &DISTANCE_TIERS)
        + when(f.above_sma_fast, ABOVE_FAST_POINTS)
        + when(f.above_sma_slow, ABOVE_SLOW_POINTS);

    Score::clamped(raw)
}

// ─── Point-in-time scoring ────────────────────────────────────────────────────

/// Scores a bar sequence as of a given day using only bars up to that day.
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Features as of `index`. Fails with `InsufficientHistory` before the
    /// warm-up period or past the end of `bars`.
    pub fn features_as_of(&self, bars: &[PriceBar], index: usize) -> Result<FeatureSet> {
        let warmup = self.config.warmup_bars;
        if index < warmup || index >= bars.len() {
            return Err(Error::InsufficientHistory {
                required: warmup.max(index) + 1,
                available: bars.len().min(index + 1),
            });
        }
        Ok(extract_features(&bars[..=index], &self.config))
    }

    pub fn score_as_of(&self, bars: &[PriceBar], index: usize) -> Result<Score> {
        self.features_as_of(bars, index).map(|f| calculate_score(&f))
    }
}

/// Score as of `index` with the default configuration.
pub fn score_as_of(bars: &[PriceBar], index: usize) -> Result<Score> {
    Scorer::default().score_as_of(bars, index)
}
