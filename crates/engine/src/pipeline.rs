use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info};

use backtest::{BacktestConfig, PerformanceMeasurer};
use common::{
    round_to, Error, PriceBar, PriceHistoryProvider, Result, ScanResult, ScoreSnapshot,
    SetupStatus, SignalOutcome,
};
use scoring::indicators::{average_volume, Adr};
use scoring::{calculate_score, extract_features, ScoringConfig, SignalDetector};

use crate::config::{HistoryConfig, ScanFilters, ScannerFileConfig};

/// Per-symbol work: fetch history as of a fixed date, then detect, scan or
/// score. Holds no mutable state, so one instance is shared by every worker.
pub struct Pipeline {
    provider: Arc<dyn PriceHistoryProvider>,
    detector: SignalDetector,
    measurer: PerformanceMeasurer,
    backtest: BacktestConfig,
    filters: ScanFilters,
    history: HistoryConfig,
    as_of: NaiveDate,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn PriceHistoryProvider>,
        config: &ScannerFileConfig,
        as_of: NaiveDate,
    ) -> Self {
        Self {
            provider,
            detector: SignalDetector::new(config.scoring.clone()),
            measurer: PerformanceMeasurer::new(config.backtest.horizons.clone()),
            backtest: config.backtest.clone(),
            filters: config.filters.clone(),
            history: config.history.clone(),
            as_of,
        }
    }

    fn scoring(&self) -> &ScoringConfig {
        self.detector.config()
    }

    /// Bars from `calendar_days` before the as-of date through the as-of date.
    /// Fails with `InsufficientHistory` when fewer than `min_bars` come back.
    async fn fetch_history(&self, symbol: &str, calendar_days: i64, min_bars: usize) -> Result<Vec<PriceBar>> {
        let start = self.as_of - Duration::days(calendar_days);
        let bars = self.provider.fetch(symbol, start, self.as_of).await?;
        if bars.len() < min_bars {
            return Err(Error::InsufficientHistory {
                required: min_bars,
                available: bars.len(),
            });
        }
        Ok(bars)
    }

    /// Historical signals for one symbol with their forward performance.
    pub async fn backtest_symbol(&self, symbol: &str) -> Result<Vec<SignalOutcome>> {
        let cfg = &self.backtest;
        let bars = self
            .fetch_history(symbol, cfg.lookback_days + cfg.warmup_days, cfg.min_bars)
            .await?;

        let outcomes: Vec<SignalOutcome> = self
            .detector
            .detect(symbol, &bars)
            .into_iter()
            .map(|signal| {
                let performance = self.measurer.measure(&signal, &bars);
                SignalOutcome { signal, performance }
            })
            .collect();

        info!(symbol, bars = bars.len(), signals = outcomes.len(), "Backtested symbol");
        Ok(outcomes)
    }

    /// Score the latest bar of a symbol that passes the liquidity filters.
    /// `Ok(None)` means the symbol was filtered out.
    pub async fn scan_symbol(&self, symbol: &str) -> Result<Option<ScanResult>> {
        let f = &self.filters;
        let bars = self.fetch_history(symbol, f.lookback_days, f.min_bars.max(1)).await?;
        let Some(last) = bars.last() else {
            return Ok(None);
        };

        if last.close < f.min_price {
            debug!(symbol, price = last.close, "Filtered: price");
            return Ok(None);
        }

        let adr = Adr::new(f.adr_period.max(1)).compute(&bars).unwrap_or(0.0);
        if adr < f.min_adr_pct {
            debug!(symbol, adr, "Filtered: ADR");
            return Ok(None);
        }

        let avg_volume = average_volume(&bars, f.volume_period);
        let dollar_volume = avg_volume * last.close;
        if dollar_volume < f.min_dollar_volume {
            debug!(symbol, dollar_volume, "Filtered: dollar volume");
            return Ok(None);
        }

        let features = extract_features(&bars, self.scoring());
        let score = calculate_score(&features);

        Ok(Some(ScanResult {
            symbol: symbol.to_string(),
            date: last.date,
            price: round_to(last.close, 2),
            score,
            status: SetupStatus::from_score(score),
            features: features.rounded(),
            adr_pct: round_to(adr, 1),
            avg_volume_millions: round_to(avg_volume / 1_000_000.0, 2),
            dollar_volume_millions: round_to(dollar_volume / 1_000_000.0, 1),
        }))
    }

    /// Daily scores from the end of warm-up through the as-of date.
    pub async fn score_history_symbol(&self, symbol: &str) -> Result<Vec<ScoreSnapshot>> {
        let h = &self.history;
        let bars = self
            .fetch_history(symbol, h.lookback_days + h.warmup_days, h.min_bars)
            .await?;
        let snapshots = self.detector.daily_scores(symbol, &bars);
        debug!(symbol, days = snapshots.len(), "Scored history");
        Ok(snapshots)
    }
}
