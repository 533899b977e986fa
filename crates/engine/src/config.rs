use std::path::Path;

use serde::{Deserialize, Serialize};

use backtest::BacktestConfig;
use common::{Error, Result};
use scoring::ScoringConfig;

/// Top-level scanner config file (TOML).
///
/// Example `config/scanner.toml`:
/// ```toml
/// [universe]
/// symbols = ["NVDA", "PLTR", "CELH"]
///
/// [filters]
/// min_price = 1.0
/// min_adr_pct = 5.0
///
/// [backtest]
/// lookback_days = 90
/// horizons = [1, 5, 20, 30]
/// ```
/// Every table is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerFileConfig {
    pub universe: UniverseConfig,
    pub scoring: ScoringConfig,
    pub backtest: BacktestConfig,
    pub filters: ScanFilters,
    pub history: HistoryConfig,
    pub tracker: TrackerConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UniverseConfig {
    /// Ticker symbols to process, e.g. "AAPL".
    pub symbols: Vec<String>,
}

/// Liquidity and volatility pre-filters for the live scan.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanFilters {
    /// Calendar days of history fetched per symbol.
    pub lookback_days: i64,
    pub min_bars: usize,
    pub min_price: f64,
    pub adr_period: usize,
    pub min_adr_pct: f64,
    /// Bars averaged for volume.
    pub volume_period: usize,
    /// Minimum of average volume times last close.
    pub min_dollar_volume: f64,
}

impl Default for ScanFilters {
    fn default() -> Self {
        Self {
            lookback_days: 120,
            min_bars: 50,
            min_price: 1.0,
            adr_period: 14,
            min_adr_pct: 5.0,
            volume_period: 20,
            min_dollar_volume: 3_500_000.0,
        }
    }
}

/// Daily score tracking.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub lookback_days: i64,
    pub warmup_days: i64,
    pub min_bars: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            lookback_days: 60,
            warmup_days: 60,
            min_bars: 70,
        }
    }
}

/// Follow-up tracking of high-scoring live scan hits.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Scan hits scoring at least this much are recorded.
    pub min_score: u8,
    /// Follow-up horizons in trading days.
    pub horizons: Vec<u32>,
    pub leaderboard_horizon: u32,
    pub leaderboard_size: usize,
    pub recent_signals_limit: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_score: 80,
            horizons: vec![1, 5, 20, 30],
            leaderboard_horizon: 5,
            leaderboard_size: 5,
            recent_signals_limit: 50,
        }
    }
}

impl ScannerFileConfig {
    /// Load from a TOML file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read scanner config at '{}': {e}", path.display()))
        })?;
        let cfg = Self::parse(&content)
            .map_err(|e| Error::Config(format!("Failed to parse scanner config at '{}': {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()?;
        for (table, horizons) in [("backtest", &self.backtest.horizons), ("tracker", &self.tracker.horizons)] {
            if horizons.contains(&0) {
                return Err(Error::Config(format!("[{table}] horizons must be at least 1 day")));
            }
        }
        if self.tracker.min_score > 100 {
            return Err(Error::Config(format!(
                "[tracker] min_score {} exceeds the maximum score of 100",
                self.tracker.min_score
            )));
        }
        Ok(())
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Symbols upper-cased, blank entries dropped, duplicates removed in
    /// first-seen order.
    pub fn symbols(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.universe
            .symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect()
    }
}
