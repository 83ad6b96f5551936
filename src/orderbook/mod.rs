//! Order book module
//!
//! Canonical per-venue books reconstructed from quote API snapshots, and the
//! synthetic cross-venue book merged from them.

mod aggregate;
mod book;
mod metrics;

pub use aggregate::{AggregatedOrderBook, AggregationEngine};
pub use book::OrderBook;
pub use metrics::TopOfBook;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{MarketDataError, Result};

/// A single level in the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LevelWire")]
pub struct OrderLevel {
    #[serde(with = "rust_decimal::serde::float")]
    price: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    size: Decimal,

    #[serde(rename = "orders")]
    order_count: u32,
}

impl OrderLevel {
    /// Create a level, rejecting non-positive prices and negative sizes
    pub fn new(price: Decimal, size: Decimal, order_count: u32) -> Result<Self> {
        if price <= Decimal::ZERO {
            return Err(MarketDataError::MalformedPayload(format!(
                "level price must be positive, got {}",
                price
            )));
        }
        if size < Decimal::ZERO {
            return Err(MarketDataError::MalformedPayload(format!(
                "level size must not be negative, got {}",
                size
            )));
        }

        Ok(Self {
            price,
            size,
            order_count,
        })
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn size(&self) -> Decimal {
        self.size
    }

    pub fn order_count(&self) -> u32 {
        self.order_count
    }
}

/// Serialized level as read back from clients; validated through `OrderLevel::new`
#[derive(Deserialize)]
struct LevelWire {
    #[serde(with = "rust_decimal::serde::float")]
    price: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    size: Decimal,

    #[serde(rename = "orders", default)]
    order_count: u32,
}

impl TryFrom<LevelWire> for OrderLevel {
    type Error = MarketDataError;

    fn try_from(wire: LevelWire) -> Result<Self> {
        OrderLevel::new(wire.price, wire.size, wire.order_count)
    }
}
