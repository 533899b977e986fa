use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use common::{Error, PriceBar, PriceHistoryProvider, Result};

/// Fixed bar sets served from memory. Used by tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    bars: HashMap<String, Vec<PriceBar>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bars for a symbol. They are sorted by date and duplicate
    /// dates collapse to the last one given.
    pub fn with_symbol(mut self, symbol: impl Into<String>, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        bars.reverse();
        bars.dedup_by_key(|b| b.date);
        bars.reverse();
        self.bars.insert(symbol.into().to_uppercase(), bars);
        self
    }
}

#[async_trait]
impl PriceHistoryProvider for InMemoryProvider {
    async fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceBar>> {
        let bars = self
            .bars
            .get(&symbol.to_uppercase())
            .ok_or_else(|| Error::data_unavailable(symbol, "unknown symbol"))?;

        let selected: Vec<PriceBar> = bars
            .iter()
            .filter(|b| b.date >= start && b.date <= end)
            .copied()
            .collect();
        debug!(symbol, bars = selected.len(), "Served bars from memory");
        Ok(selected)
    }
}
