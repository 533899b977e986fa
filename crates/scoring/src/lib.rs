pub mod config;
pub mod detector;
pub mod features;
pub mod indicators;
pub mod score;

pub use config::ScoringConfig;
pub use detector::{detect_signals, SignalDetector};
pub use features::extract_features;
pub use score::{calculate_score, score_as_of, Scorer};
