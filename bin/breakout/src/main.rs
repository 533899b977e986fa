use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use backtest::{AggregateStatistics, Aggregator};
use common::{Config, PriceHistoryProvider};
use engine::{
    live_statistics, Pipeline, Runner, ScanReport, ScannerFileConfig, Tracker, WorkerPool, YahooClient,
};
use store::SignalStore;

#[derive(Parser)]
#[command(
    name = "breakout",
    about = "Breakout-after-consolidation scanner, backtester and score tracker"
)]
struct Cli {
    /// Symbols to process instead of the configured universe (comma separated).
    #[arg(long, global = true, value_delimiter = ',')]
    symbols: Vec<String>,

    /// Evaluate as of this date (YYYY-MM-DD). Defaults to today.
    #[arg(long, global = true)]
    as_of: Option<NaiveDate>,

    /// Scanner config file. Overrides SCANNER_CONFIG_PATH.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every symbol's latest bar and write the JSON scan report.
    Scan {
        /// Output file. Overrides SCAN_OUTPUT_PATH.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Detect historical signals, measure their performance and store them.
    Backtest {
        /// Delete stored signals and performance before running.
        #[arg(long, default_value_t = false)]
        reset: bool,
    },
    /// Aggregate statistics over every stored signal.
    Stats,
    /// Compute and store daily scores for the universe.
    Record,
    /// Stored score history for one symbol.
    History {
        symbol: String,

        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Symbols whose score rose over the last few stored days.
    Trending {
        #[arg(long, default_value_t = 5)]
        days: u32,

        #[arg(long, default_value_t = 10)]
        min_increase: i64,
    },
    /// Latest stored score of every symbol.
    Latest,
    /// Record high-scoring scan hits and measure earlier ones.
    Track {
        /// Only measure stored live signals; skip the scan.
        #[arg(long, default_value_t = false)]
        update_only: bool,
    },
    /// Statistics over tracked live signals.
    LiveStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env()?;
    let config_path = cli.config.clone().unwrap_or_else(|| cfg.scanner_config_path.clone().into());
    let file = ScannerFileConfig::load(&config_path)?;
    let as_of = cli.as_of.unwrap_or_else(|| Local::now().date_naive());
    info!(config = %config_path.display(), %as_of, workers = cfg.max_workers, "Breakout scanner starting");

    match cli.command {
        Commands::Scan { output } => {
            let runner = build_runner(&cfg, &file, as_of, yahoo()?);
            let report = runner.scan(universe(&cli.symbols, &file)?).await;
            let path = output.unwrap_or_else(|| cfg.scan_output_path.clone().into());
            std::fs::write(&path, serde_json::to_string_pretty(&report)?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Scan report written");
            print_scan(&report);
        }
        Commands::Backtest { reset } => {
            let store = open_store(&cfg).await?;
            if reset {
                store.clear_backtest().await?;
            }
            let runner = build_runner(&cfg, &file, as_of, yahoo()?);
            let report = runner.backtest(universe(&cli.symbols, &file)?).await;

            let saved = store.save_outcomes(&report.outcomes).await?;
            if saved.rejected > 0 {
                warn!(rejected = saved.rejected, "Some performance records were rejected");
            }
            for failure in &report.failed {
                println!("FAILED {}: {}", failure.symbol, failure.error);
            }

            let stats = Aggregator::from_config(&file.backtest).aggregate(&store.load_outcomes().await?);
            print_stats(&stats);
        }
        Commands::Stats => {
            let store = open_store(&cfg).await?;
            let outcomes = store.load_outcomes().await?;
            if outcomes.is_empty() {
                println!("No stored signals. Run `breakout backtest` first.");
                return Ok(());
            }
            print_stats(&Aggregator::from_config(&file.backtest).aggregate(&outcomes));
        }
        Commands::Record => {
            let store = open_store(&cfg).await?;
            let runner = build_runner(&cfg, &file, as_of, yahoo()?);
            let report = runner.score_history(universe(&cli.symbols, &file)?).await;
            let rows = store.save_snapshots(&report.snapshots).await?;
            let summary = store.history_summary().await?;
            println!(
                "Recorded {rows} daily scores. {} symbols tracked, {} scoring 75+, average {:.1}",
                summary.total_symbols, summary.hot_count, summary.average_score
            );
        }
        Commands::History { symbol, days } => {
            let store = open_store(&cfg).await?;
            let points = store.stock_history(&symbol, days).await?;
            if points.is_empty() {
                println!("No history stored for {}", symbol.to_uppercase());
            }
            for p in points {
                println!(
                    "{}  score {:>3}  price {:>9.2}  prior {:>6.1}%  pullback {:>5.1}%  dist {:>5.1}%",
                    p.date, p.score, p.price, p.prior_move_pct, p.pullback_pct, p.distance_to_breakout_pct
                );
            }
        }
        Commands::Trending { days, min_increase } => {
            let store = open_store(&cfg).await?;
            for t in store.trending(days, min_increase).await? {
                println!(
                    "{:<8} {:>3} -> {:>3}  ({:+})",
                    t.symbol, t.past_score, t.current_score, t.score_change
                );
            }
        }
        Commands::Latest => {
            let store = open_store(&cfg).await?;
            for l in store.latest_scores().await? {
                println!("{:<8} {}  score {:>3}  price {:>9.2}", l.symbol, l.date, l.score, l.price);
            }
        }
        Commands::Track { update_only } => {
            let store = open_store(&cfg).await?;
            let provider = yahoo()?;
            let tracker = Tracker::new(WorkerPool::new(cfg.max_workers), provider.clone(), &file.tracker, as_of);

            if !update_only {
                let runner = build_runner(&cfg, &file, as_of, provider);
                let report = runner.scan(universe(&cli.symbols, &file)?).await;
                let recorded = store.record_live_signals(&tracker.select(&report)).await?;
                println!("Recorded {recorded} new live signals from {} passing symbols", report.total_passed);
            }

            let pending = store.pending_live_signals(tracker.horizons(), as_of).await?;
            let measured = tracker.measure_pending(pending).await;
            let saved = store.save_live_performance(&measured.records).await?;
            println!("Stored {} new measurements", saved.records);
            for failure in &measured.failed {
                println!("FAILED {}: {}", failure.symbol, failure.error);
            }

            print_stats(&tracker.summarize(&store.load_live_outcomes().await?));
        }
        Commands::LiveStats => {
            let store = open_store(&cfg).await?;
            let outcomes = store.load_live_outcomes().await?;
            if outcomes.is_empty() {
                println!("No live signals tracked yet. Run `breakout track` first.");
                return Ok(());
            }
            print_stats(&live_statistics(&file.tracker, &outcomes));
        }
    }

    Ok(())
}

async fn open_store(cfg: &Config) -> Result<SignalStore> {
    SignalStore::connect(&cfg.database_url)
        .await
        .with_context(|| format!("Failed to open database at {}", cfg.database_url))
}

fn yahoo() -> Result<Arc<dyn PriceHistoryProvider>> {
    let client: Arc<dyn PriceHistoryProvider> = Arc::new(YahooClient::new()?);
    Ok(client)
}

fn build_runner(
    cfg: &Config,
    file: &ScannerFileConfig,
    as_of: NaiveDate,
    provider: Arc<dyn PriceHistoryProvider>,
) -> Runner {
    Runner::new(WorkerPool::new(cfg.max_workers), Pipeline::new(provider, file, as_of))
}

fn universe(overrides: &[String], file: &ScannerFileConfig) -> Result<Vec<String>> {
    let symbols: Vec<String> = if overrides.is_empty() {
        file.symbols()
    } else {
        overrides
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    };
    if symbols.is_empty() {
        bail!("No symbols to process: set [universe] symbols or pass --symbols");
    }
    Ok(symbols)
}

fn print_scan(report: &ScanReport) {
    println!(
        "Scanned {} symbols, {} passed filters ({} ready, {} forming, {} watching)",
        report.total_scanned,
        report.total_passed,
        report.summary.ready,
        report.summary.forming,
        report.summary.watching
    );
    for s in report.stocks.iter().take(20) {
        println!(
            "{:<8} {:>3}  {:<8}  price {:>9.2}  ADR {:>4.1}%  $vol {:>7.1}M",
            s.symbol, s.score, s.status, s.price, s.adr_pct, s.dollar_volume_millions
        );
    }
}

fn print_stats(stats: &AggregateStatistics) {
    println!("Total signals: {}", stats.total_signals);
    for h in stats.by_horizon.values() {
        println!(
            "{:>3}d  avg {:>+7.2}%  win {:>5.1}%  gain {:>+7.2}%  dd {:>+7.2}%  n={}",
            h.horizon_days, h.avg_return, h.win_rate, h.avg_max_gain, h.avg_max_drawdown, h.sample_size
        );
    }
    if let Some(best) = stats.best_holding_period {
        println!("Best holding period: {best} days");
    }
    for (label, entries) in [("Top winners", &stats.top_winners), ("Top losers", &stats.top_losers)] {
        if entries.is_empty() {
            continue;
        }
        println!("{label}:");
        for e in entries {
            println!(
                "  {:<8} {}  score {:>3}  {:>+7.2}%",
                e.symbol, e.signal_date, e.score, e.return_pct
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_options_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "breakout",
            "track",
            "--update-only",
            "--symbols",
            "nvda,amd",
            "--as-of",
            "2024-06-03",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Track { update_only: true }));
        assert_eq!(cli.symbols, vec!["nvda", "amd"]);
        assert_eq!(cli.as_of, NaiveDate::from_ymd_opt(2024, 6, 3));
    }

    #[test]
    fn overrides_are_normalized() {
        let file = ScannerFileConfig::default();
        let symbols = universe(&[" nvda".into(), "".into(), "Amd".into()], &file).unwrap();
        assert_eq!(symbols, vec!["NVDA", "AMD"]);
        assert!(universe(&[], &file).is_err());
    }

    #[tokio::test]
    async fn unreachable_database_is_reported_with_its_url() {
        let cfg = Config {
            database_url: "sqlite:///nonexistent-dir/breakout/db.sqlite".into(),
            scanner_config_path: "config/scanner.toml".into(),
            scan_output_path: "scan_results.json".into(),
            max_workers: 1,
        };
        let err = open_store(&cfg).await.unwrap_err();
        assert!(err.to_string().contains("nonexistent-dir"));
    }
}
