pub mod consolidation;
pub mod liquidity;
pub mod slope;
pub mod sma;
pub mod swing;

pub use consolidation::{distance_to_breakout_pct, Consolidation, ConsolidationStats};
pub use liquidity::{average_volume, Adr};
pub use slope::TrendSlope;
pub use sma::Sma;
pub use swing::{prior_move_pct, Swing};
