use serde::{Deserialize, Serialize};

/// Backtest parameters, loaded from the `[backtest]` table of
/// `config/scanner.toml`. Omitted keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Holding horizons in trading days.
    pub horizons: Vec<u32>,
    /// Calendar days of history scanned for signals.
    pub lookback_days: i64,
    /// Extra calendar days fetched ahead of the lookback so indicators are
    /// warmed up by the time the scan begins.
    pub warmup_days: i64,
    /// Symbols with fewer bars than this are skipped.
    pub min_bars: usize,
    /// Horizon ranked by the winners/losers leaderboards.
    pub leaderboard_horizon: u32,
    pub leaderboard_size: usize,
    pub recent_signals_limit: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            horizons: vec![1, 5, 20, 30],
            lookback_days: 90,
            warmup_days: 60,
            min_bars: 70,
            leaderboard_horizon: 5,
            leaderboard_size: 10,
            recent_signals_limit: 50,
        }
    }
}
