use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use backtest::{AggregateStatistics, Aggregator, PerformanceMeasurer};
use common::{round_to, PerformanceRecord, PriceHistoryProvider, Result, Signal, SignalOutcome};

use crate::config::TrackerConfig;
use crate::pool::WorkerPool;
use crate::runner::{classify, ScanReport, SymbolFailure};

#[derive(Debug, Clone, Default, Serialize)]
pub struct MeasurementReport {
    /// Ordered by symbol, signal date, then horizon.
    pub records: Vec<PerformanceRecord>,
    pub skipped: Vec<String>,
    pub failed: Vec<SymbolFailure>,
}

/// Follows high-scoring live scan hits forward in time.
///
/// Selection and measurement are pure; the caller records signals and
/// measurements in the store between steps.
pub struct Tracker {
    pool: WorkerPool,
    provider: Arc<dyn PriceHistoryProvider>,
    measurer: PerformanceMeasurer,
    config: TrackerConfig,
    as_of: NaiveDate,
}

impl Tracker {
    pub fn new(
        pool: WorkerPool,
        provider: Arc<dyn PriceHistoryProvider>,
        config: &TrackerConfig,
        as_of: NaiveDate,
    ) -> Self {
        Self {
            pool,
            provider,
            measurer: PerformanceMeasurer::new(config.horizons.clone()),
            config: config.clone(),
            as_of,
        }
    }

    pub fn horizons(&self) -> &[u32] {
        &self.config.horizons
    }

    /// Scan hits at or above the tracking threshold, dated at their scan bar.
    pub fn select(&self, report: &ScanReport) -> Vec<Signal> {
        report
            .stocks
            .iter()
            .filter(|s| s.score.value() >= self.config.min_score)
            .map(|s| Signal {
                symbol: s.symbol.clone(),
                signal_date: s.date,
                signal_price: s.price,
                score: s.score,
                features: s.features,
            })
            .collect()
    }

    /// Measure the horizons each pending signal is still missing. One fetch
    /// per symbol covers all of its signals.
    pub async fn measure_pending(&self, pending: Vec<SignalOutcome>) -> MeasurementReport {
        let mut groups: HashMap<String, Vec<SignalOutcome>> = HashMap::new();
        for outcome in pending {
            groups.entry(outcome.signal.symbol.clone()).or_default().push(outcome);
        }
        let mut symbols: Vec<String> = groups.keys().cloned().collect();
        symbols.sort();
        info!(symbols = symbols.len(), "Measuring live signals");

        let groups = Arc::new(groups);
        let as_of = self.as_of;
        let results = self
            .pool
            .run(symbols, |symbol| {
                let groups = groups.clone();
                let provider = self.provider.clone();
                let measurer = self.measurer.clone();
                async move {
                    let outcomes = groups.get(&symbol).map(Vec::as_slice).unwrap_or_default();
                    measure_symbol(provider.as_ref(), &measurer, &symbol, outcomes, as_of).await
                }
            })
            .await;

        let batch = classify(results);
        let mut records: Vec<PerformanceRecord> = batch.done.into_iter().flatten().collect();
        records.sort_by(|a, b| {
            (a.symbol.as_str(), a.signal_date, a.horizon_days).cmp(&(b.symbol.as_str(), b.signal_date, b.horizon_days))
        });

        info!(records = records.len(), failed = batch.failed.len(), "Live measurement finished");
        MeasurementReport {
            records,
            skipped: batch.skipped,
            failed: batch.failed,
        }
    }

    pub fn summarize(&self, outcomes: &[SignalOutcome]) -> AggregateStatistics {
        live_statistics(&self.config, outcomes)
    }
}

/// Per-horizon statistics over tracked signals. Leaderboard returns are
/// reported to one decimal.
pub fn live_statistics(config: &TrackerConfig, outcomes: &[SignalOutcome]) -> AggregateStatistics {
    let mut stats = Aggregator::new(
        config.leaderboard_horizon,
        config.leaderboard_size,
        config.recent_signals_limit,
    )
    .aggregate(outcomes);
    for entry in stats.top_winners.iter_mut().chain(stats.top_losers.iter_mut()) {
        entry.return_pct = round_to(entry.return_pct, 1);
    }
    stats
}

async fn measure_symbol(
    provider: &dyn PriceHistoryProvider,
    measurer: &PerformanceMeasurer,
    symbol: &str,
    outcomes: &[SignalOutcome],
    as_of: NaiveDate,
) -> Result<Vec<PerformanceRecord>> {
    let Some(start) = outcomes.iter().map(|o| o.signal.signal_date).min() else {
        return Ok(Vec::new());
    };
    let bars = provider.fetch(symbol, start, as_of).await?;

    let records: Vec<PerformanceRecord> = outcomes
        .iter()
        .flat_map(|o| {
            let measured = &o.performance;
            measurer
                .measure(&o.signal, &bars)
                .into_values()
                .filter(move |r| !measured.contains_key(&r.horizon_days))
        })
        .collect();
    debug!(symbol, bars = bars.len(), records = records.len(), "Measured live signals");
    Ok(records)
}
