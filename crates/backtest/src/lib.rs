pub mod aggregate;
pub mod config;
pub mod performance;

pub use aggregate::{aggregate, AggregateStatistics, Aggregator, HorizonStats, LeaderboardEntry, RecentSignal};
pub use config::BacktestConfig;
pub use performance::{measure_performance, PerformanceMeasurer};
