//! Upstream trade feed
//!
//! Keeps one persistent connection to the trade stream, tracks the latest
//! trade per symbol and globally, and pushes new global records and periodic
//! heartbeats to trade subscribers.

mod client;
mod heartbeat;
mod latest;
mod manager;
mod processor;
mod reconnect;

pub use client::TradeStreamClient;
pub use heartbeat::{beat, run_heartbeat};
pub use latest::{LatestTrades, SharedLatestTrades};
pub use manager::{FeedState, TradeFeedManager};
pub use processor::{FrameSummary, TradeProcessor};
pub use reconnect::{FixedDelay, ReconnectPolicy};

use rust_decimal::Decimal;
use serde::Serialize;

/// Aggressor side of an executed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Executed trade as republished to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeData {
    /// Venue-qualified symbol
    #[serde(rename = "coin")]
    pub symbol: String,

    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub size: Decimal,

    pub side: TradeSide,

    /// Milliseconds since epoch
    pub timestamp: i64,

    #[serde(rename = "tid")]
    pub trade_id: u64,
}

#[cfg(test)]
pub(crate) fn sample_trade(symbol: &str, timestamp: i64) -> TradeData {
    use rust_decimal_macros::dec;

    TradeData {
        symbol: symbol.to_string(),
        price: dec!(50000.5),
        size: dec!(0.1),
        side: TradeSide::Buy,
        timestamp,
        trade_id: timestamp as u64,
    }
}
