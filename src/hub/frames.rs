//! JSON frames pushed on the streaming channels

use serde::Serialize;
use std::collections::BTreeMap;

use crate::feed::TradeData;
use crate::orderbook::AggregatedOrderBook;

/// Venue coverage of one broadcast cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleMetadata {
    pub coins_processed: usize,
    pub total_coins: usize,
}

/// Frame on the price channel
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PriceFrame {
    /// Fresh aggregate from this cycle
    AggregatedOrderBook {
        data: AggregatedOrderBook,
        metadata: CycleMetadata,
    },
    /// No venue answered; carries the last good aggregate unchanged
    Error {
        message: String,
        data: AggregatedOrderBook,
        metadata: CycleMetadata,
    },
}

impl PriceFrame {
    pub fn fresh(data: AggregatedOrderBook, metadata: CycleMetadata) -> Self {
        PriceFrame::AggregatedOrderBook { data, metadata }
    }

    pub fn stale(data: AggregatedOrderBook, metadata: CycleMetadata) -> Self {
        PriceFrame::Error {
            message: "Failed to retrieve order book data, sending last known data".to_string(),
            data,
            metadata,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, PriceFrame::Error { .. })
    }
}

/// Frame on the trade channel
#[derive(Debug, Clone, Serialize)]
pub struct TradeFrame {
    pub success: bool,
    pub data: BTreeMap<String, TradeData>,
    /// Time of the carried trade, milliseconds since epoch
    pub timestamp: i64,
}

impl TradeFrame {
    pub fn for_trade(trade: &TradeData) -> Self {
        Self {
            success: true,
            data: BTreeMap::from([(trade.symbol.clone(), trade.clone())]),
            timestamp: trade.timestamp,
        }
    }
}
