use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One daily OHLCV bar. Sequences are ordered oldest first with strictly
/// increasing dates; missing trading days are simply absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Features computed as of one bar from its trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureSet {
    pub prior_move_pct: f64,
    pub sma_fast_slope: f64,
    pub sma_slow_slope: f64,
    pub pullback_pct: f64,
    pub volume_decline_pct: f64,
    pub range_tightening: bool,
    pub distance_to_breakout_pct: f64,
    pub above_sma_fast: bool,
    pub above_sma_slow: bool,
}

impl FeatureSet {
    /// The persisted precision: percentages to 1 dp, volume decline to 0 dp,
    /// slopes to 2 dp. Scoring always runs on the unrounded values.
    pub fn rounded(&self) -> Self {
        Self {
            prior_move_pct: round_to(self.prior_move_pct, 1),
            sma_fast_slope: round_to(self.sma_fast_slope, 2),
            sma_slow_slope: round_to(self.sma_slow_slope, 2),
            pullback_pct: round_to(self.pullback_pct, 1),
            volume_decline_pct: round_to(self.volume_decline_pct, 0),
            range_tightening: self.range_tightening,
            distance_to_breakout_pct: round_to(self.distance_to_breakout_pct, 1),
            above_sma_fast: self.above_sma_fast,
            above_sma_slow: self.above_sma_slow,
        }
    }
}

// ─── Score ────────────────────────────────────────────────────────────────────

/// Breakout score, always within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Score(u8);

impl Score {
    pub const MAX: Score = Score(100);

    /// Clamp a raw point total into range.
    pub fn clamped(raw: i32) -> Self {
        Score(raw.clamp(0, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Score {
    type Error = Error;

    /// Strict conversion for values read back from storage or other
    /// producers: out-of-range scores are defects, not clamped.
    fn try_from(raw: i64) -> Result<Self> {
        if (0..=100).contains(&raw) {
            Ok(Score(raw as u8))
        } else {
            Err(Error::MalformedResult(format!("score {raw} outside 0..=100")))
        }
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Live-scan classification derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupStatus {
    Ready,
    Forming,
    Watching,
}

impl SetupStatus {
    pub fn from_score(score: Score) -> Self {
        match score.value() {
            75.. => SetupStatus::Ready,
            50..=74 => SetupStatus::Forming,
            _ => SetupStatus::Watching,
        }
    }
}

impl std::fmt::Display for SetupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            SetupStatus::Ready => "ready",
            SetupStatus::Forming => "forming",
            SetupStatus::Watching => "watching",
        })
    }
}

// ─── Signals & performance ───────────────────────────────────────────────────

/// A historical day on which the score crossed the detection threshold.
/// Identified by `(symbol, signal_date)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub symbol: String,
    pub signal_date: NaiveDate,
    pub signal_price: f64,
    pub score: Score,
    pub features: FeatureSet,
}

impl Signal {
    pub fn key(&self) -> (&str, NaiveDate) {
        (&self.symbol, self.signal_date)
    }
}

/// Outcome of holding a signal for a fixed number of trading days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRecord {
    pub symbol: String,
    pub signal_date: NaiveDate,
    pub horizon_days: u32,
    pub exit_date: NaiveDate,
    pub exit_price: f64,
    pub return_pct: f64,
    pub max_gain_pct: f64,
    /// Not clamped: a positive value means price never traded below entry.
    pub max_drawdown_pct: f64,
}

impl PerformanceRecord {
    /// Reject records that must never reach storage.
    pub fn validate(&self) -> Result<()> {
        if self.exit_date <= self.signal_date {
            return Err(Error::MalformedResult(format!(
                "{} {}: exit date {} not after signal date",
                self.symbol, self.horizon_days, self.exit_date
            )));
        }
        if self.horizon_days == 0 {
            return Err(Error::MalformedResult(format!(
                "{} {}: zero holding horizon",
                self.symbol, self.signal_date
            )));
        }
        let values = [
            self.exit_price,
            self.return_pct,
            self.max_gain_pct,
            self.max_drawdown_pct,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::MalformedResult(format!(
                "{} {}: non-finite performance value",
                self.symbol, self.signal_date
            )));
        }
        Ok(())
    }
}

/// A signal together with whatever horizons could be measured for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalOutcome {
    pub signal: Signal,
    pub performance: BTreeMap<u32, PerformanceRecord>,
}

impl SignalOutcome {
    pub fn return_at(&self, horizon: u32) -> Option<f64> {
        self.performance.get(&horizon).map(|p| p.return_pct)
    }
}

// ─── Score history & live scan ───────────────────────────────────────────────

/// The score of one symbol on one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreSnapshot {
    pub symbol: String,
    pub date: NaiveDate,
    pub score: Score,
    pub price: f64,
    pub features: FeatureSet,
}

/// A symbol that passed the live-scan filters, scored as of its last bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub symbol: String,
    pub date: NaiveDate,
    pub price: f64,
    pub score: Score,
    pub status: SetupStatus,
    #[serde(flatten)]
    pub features: FeatureSet,
    pub adr_pct: f64,
    pub avg_volume_millions: f64,
    pub dollar_volume_millions: f64,
}

/// Round to `decimals` places, exact ties going to the even neighbour.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn record(signal_day: u32, exit_day: u32) -> PerformanceRecord {
        PerformanceRecord {
            symbol: "ABC".into(),
            signal_date: date(signal_day),
            horizon_days: 1,
            exit_date: date(exit_day),
            exit_price: 10.0,
            return_pct: 1.0,
            max_gain_pct: 2.0,
            max_drawdown_pct: -1.0,
        }
    }

    #[test]
    fn score_clamps_into_range() {
        assert_eq!(Score::clamped(-5).value(), 0);
        assert_eq!(Score::clamped(140).value(), 100);
        assert_eq!(Score::clamped(75).value(), 75);
    }

    #[test]
    fn score_try_from_rejects_out_of_range() {
        assert!(matches!(Score::try_from(101), Err(Error::MalformedResult(_))));
        assert!(matches!(Score::try_from(-1), Err(Error::MalformedResult(_))));
        assert_eq!(Score::try_from(100).unwrap(), Score::MAX);
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(SetupStatus::from_score(Score::clamped(75)), SetupStatus::Ready);
        assert_eq!(SetupStatus::from_score(Score::clamped(74)), SetupStatus::Forming);
        assert_eq!(SetupStatus::from_score(Score::clamped(50)), SetupStatus::Forming);
        assert_eq!(SetupStatus::from_score(Score::clamped(49)), SetupStatus::Watching);
    }

    #[test]
    fn record_with_exit_on_signal_date_is_malformed() {
        assert!(record(5, 5).validate().is_err());
        assert!(record(5, 4).validate().is_err());
        assert!(record(5, 6).validate().is_ok());
    }

    #[test]
    fn rounded_features_follow_persisted_precision() {
        let f = FeatureSet {
            prior_move_pct: 45.26,
            sma_fast_slope: 1.23456,
            sma_slow_slope: -0.005,
            pullback_pct: 7.04,
            volume_decline_pct: 33.6,
            range_tightening: true,
            distance_to_breakout_pct: 2.25,
            above_sma_fast: true,
            above_sma_slow: false,
        };
        let r = f.rounded();
        assert_eq!(r.prior_move_pct, 45.3);
        assert_eq!(r.sma_fast_slope, 1.23);
        assert_eq!(r.pullback_pct, 7.0);
        assert_eq!(r.volume_decline_pct, 34.0);
        assert!(r.range_tightening);
    }

    #[test]
    fn exact_ties_round_to_even() {
        // (240000 - 138000) / 240000 * 100
        assert_eq!(round_to(42.5, 0), 42.0);
        assert_eq!(round_to(43.5, 0), 44.0);
        assert_eq!(round_to(2.25, 1), 2.2);
        assert_eq!(round_to(-0.5, 0), 0.0);
        assert_eq!(round_to(12.3456, 2), 12.35);

        let f = FeatureSet {
            volume_decline_pct: (240_000.0 - 138_000.0) / 240_000.0 * 100.0,
            distance_to_breakout_pct: 2.25,
            ..FeatureSet::default()
        };
        let r = f.rounded();
        assert_eq!(r.volume_decline_pct, 42.0);
        assert_eq!(r.distance_to_breakout_pct, 2.2);
    }
}
