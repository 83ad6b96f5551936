//! Canonical order book and its reconstruction from venue snapshots
//!
//! Levels are kept in the order the venue sent them (bids descending, asks
//! ascending); only the top-of-book metrics are derived here.

use serde::{Deserialize, Serialize};

use super::{OrderLevel, TopOfBook};
use crate::error::Result;
use crate::parser::{L2BookSnapshot, RawLevel};

/// Order book for a single symbol at one point in time
///
/// Deserializing recomputes the top of book from the levels; any serialized
/// `best_*` fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "OrderBookWire")]
pub struct OrderBook {
    #[serde(rename = "coin")]
    symbol: String,

    /// Milliseconds since epoch
    timestamp: i64,

    /// Bids, highest price first
    bids: Vec<OrderLevel>,

    /// Asks, lowest price first
    asks: Vec<OrderLevel>,

    #[serde(flatten)]
    top: TopOfBook,
}

impl OrderBook {
    /// Build a book from best-first levels, deriving best bid/ask, spread and mid
    pub fn new(symbol: &str, timestamp: i64, bids: Vec<OrderLevel>, asks: Vec<OrderLevel>) -> Self {
        let top = TopOfBook::from_levels(&bids, &asks);
        Self {
            symbol: symbol.to_string(),
            timestamp,
            bids,
            asks,
            top,
        }
    }

    /// Reconstruct a canonical book from a raw l2Book response
    ///
    /// Fails with `MalformedPayload` when a level is missing numeric fields.
    pub fn reconstruct(raw: serde_json::Value, symbol: &str) -> Result<Self> {
        let snapshot = L2BookSnapshot::parse(raw)?;
        Self::from_snapshot(&snapshot, symbol)
    }

    /// Reconstruct from an already decoded snapshot
    pub fn from_snapshot(snapshot: &L2BookSnapshot, symbol: &str) -> Result<Self> {
        let bids = convert_levels(snapshot.bids())?;
        let asks = convert_levels(snapshot.asks())?;
        Ok(Self::new(symbol, snapshot.time, bids, asks))
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn bids(&self) -> &[OrderLevel] {
        &self.bids
    }

    pub fn asks(&self) -> &[OrderLevel] {
        &self.asks
    }

    pub fn top(&self) -> &TopOfBook {
        &self.top
    }
}

#[derive(Deserialize)]
struct OrderBookWire {
    #[serde(rename = "coin")]
    symbol: String,

    #[serde(default)]
    timestamp: i64,

    #[serde(default)]
    bids: Vec<OrderLevel>,

    #[serde(default)]
    asks: Vec<OrderLevel>,
}

impl From<OrderBookWire> for OrderBook {
    fn from(wire: OrderBookWire) -> Self {
        OrderBook::new(&wire.symbol, wire.timestamp, wire.bids, wire.asks)
    }
}

fn convert_levels(raw: &[RawLevel]) -> Result<Vec<OrderLevel>> {
    raw.iter()
        .map(|level| OrderLevel::new(level.px, level.sz, level.n))
        .collect()
}
