//! Top-of-book metrics calculation

use rust_decimal::Decimal;
use serde::Serialize;

use super::OrderLevel;

/// Best prices derived from a book's first level on each side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TopOfBook {
    /// Highest bid, absent when there are no bids
    #[serde(with = "rust_decimal::serde::float_option")]
    pub best_bid: Option<Decimal>,

    /// Lowest ask, absent when there are no asks
    #[serde(with = "rust_decimal::serde::float_option")]
    pub best_ask: Option<Decimal>,

    /// `best_ask - best_bid`; negative when venues are crossed
    #[serde(with = "rust_decimal::serde::float_option")]
    pub spread: Option<Decimal>,

    /// Average of best bid and ask
    #[serde(with = "rust_decimal::serde::float_option")]
    pub mid_price: Option<Decimal>,
}

impl TopOfBook {
    /// Compute from levels already ordered best-first
    pub fn from_levels(bids: &[OrderLevel], asks: &[OrderLevel]) -> Self {
        let best_bid = bids.first().map(OrderLevel::price);
        let best_ask = asks.first().map(OrderLevel::price);

        let (spread, mid_price) = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => (Some(ask - bid), Some((bid + ask) / Decimal::from(2))),
            _ => (None, None),
        };

        Self {
            best_bid,
            best_ask,
            spread,
            mid_price,
        }
    }
}
