use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use common::{round_to, Score, SignalOutcome};

use crate::config::BacktestConfig;

/// Summary of every record at one holding horizon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HorizonStats {
    pub horizon_days: u32,
    pub avg_return: f64,
    /// Percentage of records with a positive return.
    pub win_rate: f64,
    pub avg_max_gain: f64,
    pub avg_max_drawdown: f64,
    pub sample_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub symbol: String,
    pub signal_date: NaiveDate,
    pub score: Score,
    pub return_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentSignal {
    pub symbol: String,
    pub signal_date: NaiveDate,
    pub score: Score,
    pub signal_price: f64,
    /// Return by horizon; horizons not yet reached are absent.
    pub returns: BTreeMap<u32, f64>,
}

/// Read model over all signals and their performance.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AggregateStatistics {
    pub total_signals: usize,
    /// Only horizons with at least one record appear.
    pub by_horizon: BTreeMap<u32, HorizonStats>,
    pub best_holding_period: Option<u32>,
    pub top_winners: Vec<LeaderboardEntry>,
    pub top_losers: Vec<LeaderboardEntry>,
    pub recent_signals: Vec<RecentSignal>,
}

/// Reduces outcomes into `AggregateStatistics`.
#[derive(Debug, Clone)]
pub struct Aggregator {
    leaderboard_horizon: u32,
    leaderboard_size: usize,
    recent_limit: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::from_config(&BacktestConfig::default())
    }
}

impl Aggregator {
    pub fn new(leaderboard_horizon: u32, leaderboard_size: usize, recent_limit: usize) -> Self {
        Self {
            leaderboard_horizon,
            leaderboard_size,
            recent_limit,
        }
    }

    pub fn from_config(cfg: &BacktestConfig) -> Self {
        Self::new(cfg.leaderboard_horizon, cfg.leaderboard_size, cfg.recent_signals_limit)
    }

    pub fn aggregate(&self, outcomes: &[SignalOutcome]) -> AggregateStatistics {
        let by_horizon = horizon_stats(outcomes);

        // Strict comparison keeps the shortest horizon on ties.
        let best_holding_period = by_horizon
            .values()
            .fold(None::<&HorizonStats>, |best, s| match best {
                Some(b) if s.avg_return <= b.avg_return => Some(b),
                _ => Some(s),
            })
            .map(|s| s.horizon_days);

        let mut ranked: Vec<LeaderboardEntry> = outcomes
            .iter()
            .filter_map(|o| {
                o.return_at(self.leaderboard_horizon).map(|r| LeaderboardEntry {
                    symbol: o.signal.symbol.clone(),
                    signal_date: o.signal.signal_date,
                    score: o.signal.score,
                    return_pct: r,
                })
            })
            .collect();

        // Stable sorts: equal returns keep scan order.
        ranked.sort_by(|a, b| b.return_pct.total_cmp(&a.return_pct));
        let top_winners: Vec<LeaderboardEntry> =
            ranked.iter().take(self.leaderboard_size).cloned().collect();
        ranked.sort_by(|a, b| a.return_pct.total_cmp(&b.return_pct));
        let top_losers: Vec<LeaderboardEntry> =
            ranked.into_iter().take(self.leaderboard_size).collect();

        let mut recent: Vec<&SignalOutcome> = outcomes.iter().collect();
        recent.sort_by(|a, b| b.signal.signal_date.cmp(&a.signal.signal_date));
        let recent_signals = recent
            .into_iter()
            .take(self.recent_limit)
            .map(|o| RecentSignal {
                symbol: o.signal.symbol.clone(),
                signal_date: o.signal.signal_date,
                score: o.signal.score,
                signal_price: o.signal.signal_price,
                returns: o
                    .performance
                    .iter()
                    .map(|(&h, p)| (h, p.return_pct))
                    .collect(),
            })
            .collect();

        AggregateStatistics {
            total_signals: outcomes.len(),
            by_horizon,
            best_holding_period,
            top_winners,
            top_losers,
            recent_signals,
        }
    }
}

/// Aggregate with the default leaderboard horizon (5) and sizes.
pub fn aggregate(outcomes: &[SignalOutcome]) -> AggregateStatistics {
    Aggregator::default().aggregate(outcomes)
}

fn horizon_stats(outcomes: &[SignalOutcome]) -> BTreeMap<u32, HorizonStats> {
    #[derive(Default)]
    struct Acc {
        n: usize,
        wins: usize,
        ret: f64,
        gain: f64,
        drawdown: f64,
    }

    let mut acc: BTreeMap<u32, Acc> = BTreeMap::new();
    for record in outcomes.iter().flat_map(|o| o.performance.values()) {
        let a = acc.entry(record.horizon_days).or_default();
        a.n += 1;
        if record.return_pct > 0.0 {
            a.wins += 1;
        }
        a.ret += record.return_pct;
        a.gain += record.max_gain_pct;
        a.drawdown += record.max_drawdown_pct;
    }

    acc.into_iter()
        .map(|(h, a)| {
            let n = a.n as f64;
            let stats = HorizonStats {
                horizon_days: h,
                avg_return: round_to(a.ret / n, 2),
                win_rate: round_to(a.wins as f64 / n * 100.0, 1),
                avg_max_gain: round_to(a.gain / n, 2),
                avg_max_drawdown: round_to(a.drawdown / n, 2),
                sample_size: a.n,
            };
            (h, stats)
        })
        .collect()
}
