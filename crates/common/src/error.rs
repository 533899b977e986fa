use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Too few bars for the requested operation. Callers treat this as a
    /// normal skip, not a failure.
    #[error("Insufficient history: need {required} bars, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("Data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// A score or performance record that violates its invariants.
    #[error("Malformed result: {0}")]
    MalformedResult(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn data_unavailable(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::DataUnavailable {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// True for the skip conditions that should not be reported as failures.
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::InsufficientHistory { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
