//! Cross-venue order book aggregation
//!
//! Uses BTreeMap keyed by price so merged levels come out sorted and unique.

use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{OrderBook, OrderLevel};
use crate::error::{MarketDataError, Result};

/// Synthetic book merged from several venue books
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedOrderBook {
    #[serde(flatten)]
    book: OrderBook,

    /// Venue symbols that contributed to this merge
    sources: Vec<String>,
}

impl AggregatedOrderBook {
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }
}

/// Summed size and order count at one price
#[derive(Debug, Default, Clone, Copy)]
struct LevelTotals {
    size: Decimal,
    order_count: u32,
}

impl LevelTotals {
    /// Fails with `MalformedPayload` when the summed size overflows `Decimal`
    fn add(&mut self, level: &OrderLevel) -> Result<()> {
        self.size = self.size.checked_add(level.size()).ok_or_else(|| {
            MarketDataError::MalformedPayload(format!(
                "summed size at price {} overflows",
                level.price()
            ))
        })?;
        self.order_count = self.order_count.saturating_add(level.order_count());
        Ok(())
    }
}

/// Merges per-venue books into one synthetic book
#[derive(Debug, Clone)]
pub struct AggregationEngine {
    symbol: String,
}

impl AggregationEngine {
    /// `symbol` is the synthetic identifier stamped on every merged book
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Merge books, stamped with the current wall-clock time
    pub fn aggregate(&self, books: &[OrderBook], sources: &[String]) -> Result<AggregatedOrderBook> {
        self.aggregate_at(books, sources, chrono::Utc::now().timestamp_millis())
    }

    /// Merge books with an explicit timestamp (milliseconds)
    ///
    /// Levels at exactly equal prices are summed. An empty input is an error:
    /// "no venue responded" must stay distinguishable from "venues responded
    /// with empty books".
    pub fn aggregate_at(
        &self,
        books: &[OrderBook],
        sources: &[String],
        timestamp: i64,
    ) -> Result<AggregatedOrderBook> {
        if books.is_empty() {
            return Err(MarketDataError::NoVenuesAvailable {
                attempted: sources.len(),
            });
        }

        let mut bids: BTreeMap<Reverse<Decimal>, LevelTotals> = BTreeMap::new();
        let mut asks: BTreeMap<Decimal, LevelTotals> = BTreeMap::new();

        for book in books {
            for level in book.bids() {
                bids.entry(Reverse(level.price())).or_default().add(level)?;
            }
            for level in book.asks() {
                asks.entry(level.price()).or_default().add(level)?;
            }
        }

        let bids = bids
            .into_iter()
            .map(|(Reverse(price), totals)| merged_level(price, totals))
            .collect::<Result<Vec<_>>>()?;
        let asks = asks
            .into_iter()
            .map(|(price, totals)| merged_level(price, totals))
            .collect::<Result<Vec<_>>>()?;

        Ok(AggregatedOrderBook {
            book: OrderBook::new(&self.symbol, timestamp, bids, asks),
            sources: sources.to_vec(),
        })
    }
}

fn merged_level(price: Decimal, totals: LevelTotals) -> Result<OrderLevel> {
    OrderLevel::new(price, totals.size, totals.order_count)
}
