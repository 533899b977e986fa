use crate::{Error, Result};

/// Process configuration loaded from environment variables at startup.
/// Every variable has a default, so a bare checkout runs without a `.env`.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Scanner config file path
    pub scanner_config_path: String,

    // Where the live scan writes its JSON report
    pub scan_output_path: String,

    // Worker pool width for per-symbol fan-out
    pub max_workers: usize,
}

impl Config {
    /// Load configuration from the environment, reading `.env` if present.
    /// Unparseable values are reported as `Error::Config`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let max_workers = match optional_env("MAX_WORKERS") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                Error::Config(format!("MAX_WORKERS must be a positive integer, got: '{raw}'"))
            })?,
            None => 5,
        };
        if max_workers == 0 {
            return Err(Error::Config("MAX_WORKERS must be at least 1".into()));
        }

        Ok(Config {
            database_url: optional_env("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://breakout_signals.db".to_string()),
            scanner_config_path: optional_env("SCANNER_CONFIG_PATH")
                .unwrap_or_else(|| "config/scanner.toml".to_string()),
            scan_output_path: optional_env("SCAN_OUTPUT_PATH")
                .unwrap_or_else(|| "scan_results.json".to_string()),
            max_workers,
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
