use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use common::{Result, ScanResult, ScoreSnapshot, SetupStatus, SignalOutcome};

use crate::pipeline::Pipeline;
use crate::pool::WorkerPool;

/// A symbol whose job ended in an error other than a skip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BacktestReport {
    /// Ordered by symbol, then signal date.
    pub outcomes: Vec<SignalOutcome>,
    /// Symbols without enough history.
    pub skipped: Vec<String>,
    pub failed: Vec<SymbolFailure>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScanSummary {
    pub ready: usize,
    pub forming: usize,
    pub watching: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan_time: DateTime<Utc>,
    pub total_scanned: usize,
    pub total_passed: usize,
    pub summary: ScanSummary,
    /// Highest score first.
    pub stocks: Vec<ScanResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<SymbolFailure>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HistoryReport {
    pub snapshots: Vec<ScoreSnapshot>,
    pub skipped: Vec<String>,
    pub failed: Vec<SymbolFailure>,
}

/// Drives a [`Pipeline`] over a symbol universe on a [`WorkerPool`].
///
/// Every phase is parallel and side-effect free; persistence is left to the
/// caller once a report is complete.
pub struct Runner {
    pool: WorkerPool,
    pipeline: Arc<Pipeline>,
}

impl Runner {
    pub fn new(pool: WorkerPool, pipeline: Pipeline) -> Self {
        Self {
            pool,
            pipeline: Arc::new(pipeline),
        }
    }

    pub async fn backtest(&self, symbols: Vec<String>) -> BacktestReport {
        info!(symbols = symbols.len(), workers = self.pool.width(), "Starting backtest");
        let batch = self
            .fan_out(symbols, |p, s| async move { p.backtest_symbol(&s).await })
            .await;

        let mut outcomes: Vec<SignalOutcome> = batch.done.into_iter().flatten().collect();
        outcomes.sort_by(|a, b| a.signal.key().cmp(&b.signal.key()));

        info!(
            signals = outcomes.len(),
            skipped = batch.skipped.len(),
            failed = batch.failed.len(),
            "Backtest finished"
        );
        BacktestReport {
            outcomes,
            skipped: batch.skipped,
            failed: batch.failed,
        }
    }

    pub async fn scan(&self, symbols: Vec<String>) -> ScanReport {
        let total_scanned = symbols.len();
        info!(symbols = total_scanned, workers = self.pool.width(), "Starting scan");
        let batch = self
            .fan_out(symbols, |p, s| async move { p.scan_symbol(&s).await })
            .await;

        let mut stocks: Vec<ScanResult> = batch.done.into_iter().flatten().collect();
        stocks.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.symbol.cmp(&b.symbol)));

        let mut summary = ScanSummary::default();
        for stock in &stocks {
            match stock.status {
                SetupStatus::Ready => summary.ready += 1,
                SetupStatus::Forming => summary.forming += 1,
                SetupStatus::Watching => summary.watching += 1,
            }
        }

        info!(
            passed = stocks.len(),
            ready = summary.ready,
            forming = summary.forming,
            "Scan finished"
        );
        ScanReport {
            scan_time: Utc::now(),
            total_scanned,
            total_passed: stocks.len(),
            summary,
            stocks,
            failed: batch.failed,
        }
    }

    pub async fn score_history(&self, symbols: Vec<String>) -> HistoryReport {
        info!(symbols = symbols.len(), "Recording score history");
        let batch = self
            .fan_out(symbols, |p, s| async move { p.score_history_symbol(&s).await })
            .await;

        let mut snapshots: Vec<ScoreSnapshot> = batch.done.into_iter().flatten().collect();
        snapshots.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.date.cmp(&b.date)));

        info!(snapshots = snapshots.len(), failed = batch.failed.len(), "Score history computed");
        HistoryReport {
            snapshots,
            skipped: batch.skipped,
            failed: batch.failed,
        }
    }

    /// Run one pipeline job per symbol on the pool.
    async fn fan_out<T, F, Fut>(&self, symbols: Vec<String>, job: F) -> Batch<T>
    where
        F: Fn(Arc<Pipeline>, String) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let results = self
            .pool
            .run(symbols, |symbol| job(self.pipeline.clone(), symbol))
            .await;
        classify(results)
    }
}

/// Sort pool results into done, skipped and failed, logging the latter two.
pub(crate) fn classify<T>(results: Vec<(String, Result<T>)>) -> Batch<T> {
    let mut batch = Batch {
        done: Vec::with_capacity(results.len()),
        skipped: Vec::new(),
        failed: Vec::new(),
    };
    for (symbol, result) in results {
        match result {
            Ok(value) => batch.done.push(value),
            Err(e) if e.is_skip() => {
                warn!(symbol = %symbol, reason = %e, "Skipping symbol");
                batch.skipped.push(symbol);
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Symbol failed");
                batch.failed.push(SymbolFailure {
                    symbol,
                    error: e.to_string(),
                });
            }
        }
    }
    batch.skipped.sort();
    batch.failed.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    batch
}

pub(crate) struct Batch<T> {
    pub done: Vec<T>,
    pub skipped: Vec<String>,
    pub failed: Vec<SymbolFailure>,
}
