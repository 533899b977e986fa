pub mod config;
pub mod memory;
pub mod pipeline;
pub mod pool;
pub mod runner;
pub mod tracker;
pub mod yahoo;

pub use config::{HistoryConfig, ScanFilters, ScannerFileConfig, TrackerConfig, UniverseConfig};
pub use memory::InMemoryProvider;
pub use pipeline::Pipeline;
pub use pool::WorkerPool;
pub use runner::{BacktestReport, HistoryReport, Runner, ScanReport, ScanSummary, SymbolFailure};
pub use tracker::{live_statistics, MeasurementReport, Tracker};
pub use yahoo::YahooClient;
