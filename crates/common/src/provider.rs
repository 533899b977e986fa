use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{PriceBar, Result};

/// Abstraction over the market-data source.
///
/// `YahooClient` implements this against the public chart API.
/// `InMemoryProvider` implements this for tests and offline runs.
///
/// Implementations return bars oldest first with strictly increasing dates.
/// A history shorter than requested is not an error; an unknown symbol or an
/// unreachable provider is `Error::DataUnavailable`.
#[async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    /// Fetch daily bars for `symbol` with `start <= date <= end`.
    async fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<PriceBar>>;
}
