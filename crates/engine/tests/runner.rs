use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use common::{PriceBar, SetupStatus};
use engine::{InMemoryProvider, Pipeline, Runner, ScannerFileConfig, WorkerPool};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

/// 70 bars of steady climb from 40 to 109, then a flat shelf at 107.
fn uptrend_then_flat(volume: f64) -> Vec<PriceBar> {
    (0..90)
        .map(|k| {
            let close = if k < 70 { 40.0 + k as f64 } else { 107.0 };
            PriceBar {
                date: start() + Duration::days(k),
                open: close,
                high: close * 1.03,
                low: close * 0.97,
                close,
                volume,
            }
        })
        .collect()
}

fn runner(provider: InMemoryProvider) -> Runner {
    let as_of = start() + Duration::days(89);
    let pipeline = Pipeline::new(Arc::new(provider), &ScannerFileConfig::default(), as_of);
    Runner::new(WorkerPool::new(2), pipeline)
}

fn universe() -> InMemoryProvider {
    InMemoryProvider::new()
        .with_symbol("UP", uptrend_then_flat(1_000_000.0))
        .with_symbol("THIN", uptrend_then_flat(1_000.0))
        .with_symbol("SHORT", uptrend_then_flat(1_000_000.0)[..30].to_vec())
}

fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn backtest_isolates_skips_and_failures() {
    let report = runner(universe())
        .backtest(symbols(&["UP", "SHORT", "MISSING"]))
        .await;

    assert_eq!(report.outcomes.len(), 1);
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.signal.symbol, "UP");
    assert_eq!(outcome.signal.signal_date, start() + Duration::days(70));
    assert_eq!(outcome.signal.signal_price, 107.0);
    assert_eq!(outcome.signal.score.value(), 75);
    assert_eq!(outcome.performance.keys().copied().collect::<Vec<_>>(), vec![1, 5]);
    assert_eq!(outcome.return_at(5), Some(0.0));

    assert_eq!(report.skipped, vec!["SHORT"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].symbol, "MISSING");
}

#[tokio::test]
async fn scan_reports_passing_symbols_only() {
    let report = runner(universe())
        .scan(symbols(&["UP", "THIN", "MISSING"]))
        .await;

    assert_eq!(report.total_scanned, 3);
    assert_eq!(report.total_passed, 1);
    assert_eq!(report.failed.len(), 1);

    let up = &report.stocks[0];
    assert_eq!(up.symbol, "UP");
    assert_eq!(up.date, start() + Duration::days(89));
    assert_eq!(up.score.value(), 45);
    assert_eq!(up.status, SetupStatus::Watching);
    assert_eq!(up.adr_pct, 6.2);
    assert_eq!(up.avg_volume_millions, 1.0);
    assert_eq!(up.dollar_volume_millions, 107.0);
    assert_eq!(report.summary.watching, 1);
    assert_eq!(report.summary.ready + report.summary.forming, 0);
}

#[tokio::test]
async fn scan_report_serializes_flat_features() {
    let report = runner(universe()).scan(symbols(&["UP"])).await;
    let json = serde_json::to_value(&report).unwrap();
    let stock = &json["stocks"][0];
    assert_eq!(stock["status"], "watching");
    assert!(stock.get("prior_move_pct").is_some());
    assert!(json.get("failed").is_none());
}

#[tokio::test]
async fn score_history_covers_post_warmup_days() {
    let report = runner(universe())
        .score_history(symbols(&["UP", "SHORT"]))
        .await;

    assert_eq!(report.skipped, vec!["SHORT"]);
    let scores: Vec<u8> = report.snapshots.iter().map(|s| s.score.value()).collect();
    assert_eq!(scores.len(), 30);
    assert_eq!(scores[0], 65);
    assert_eq!(scores[10], 75);
    assert_eq!(scores[29], 45);
}
