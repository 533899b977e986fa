use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// Window lengths and thresholds for feature extraction and detection.
///
/// Loaded from the `[scoring]` table of `config/scanner.toml`:
/// ```toml
/// [scoring]
/// sma_fast = 10
/// sma_slow = 20
/// detection_threshold = 75
/// dedup_window_days = 5
/// ```
/// Omitted keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Fast moving-average period.
    pub sma_fast: usize,
    /// Slow moving-average period.
    pub sma_slow: usize,
    /// Number of trailing moving-average values fed to the slope fit.
    pub slope_period: usize,
    /// Trailing closes searched for the swing low/high.
    pub prior_move_lookback: usize,
    /// Trailing bars treated as the consolidation window.
    pub consolidation_lookback: usize,
    /// Below this many bars the consolidation analysis reports neutral values.
    pub min_consolidation_bars: usize,
    /// Days before this index are never scored.
    pub warmup_bars: usize,
    /// Score at or above which a day becomes a candidate signal.
    pub detection_threshold: u8,
    /// A candidate closer than this many calendar days to an accepted
    /// signal is suppressed.
    pub dedup_window_days: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            sma_fast: 10,
            sma_slow: 20,
            slope_period: 10,
            prior_move_lookback: 60,
            consolidation_lookback: 20,
            min_consolidation_bars: 10,
            warmup_bars: 60,
            detection_threshold: 75,
            dedup_window_days: 5,
        }
    }
}

impl ScoringConfig {
    /// Reject windows the indicators cannot be built with.
    pub fn validate(&self) -> Result<()> {
        let windows = [
            ("sma_fast", self.sma_fast),
            ("sma_slow", self.sma_slow),
            ("slope_period", self.slope_period),
            ("consolidation_lookback", self.consolidation_lookback),
        ];
        if let Some((name, _)) = windows.iter().find(|(_, v)| *v == 0) {
            return Err(Error::Config(format!("[scoring] {name} must be at least 1")));
        }
        if self.detection_threshold > 100 {
            return Err(Error::Config(format!(
                "[scoring] detection_threshold {} exceeds the maximum score of 100",
                self.detection_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ScoringConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_windows_are_rejected() {
        let cfg = ScoringConfig {
            sma_slow: 0,
            ..ScoringConfig::default()
        };
        match cfg.validate() {
            Err(Error::Config(msg)) => assert!(msg.contains("sma_slow")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn threshold_above_max_score_is_rejected() {
        let cfg = ScoringConfig {
            detection_threshold: 101,
            ..ScoringConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }
}
