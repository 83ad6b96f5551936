//! Latest-trade cache

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::TradeData;

/// Cache shared between the feed, the heartbeat and the trade channel
pub type SharedLatestTrades = Arc<RwLock<LatestTrades>>;

/// Most recent trade per symbol, plus the most recent trade overall
#[derive(Debug, Default)]
pub struct LatestTrades {
    by_symbol: HashMap<String, TradeData>,
    global: Option<TradeData>,
}

impl LatestTrades {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedLatestTrades {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Record a trade; returns true when it became the new global latest
    ///
    /// The per-symbol entry always takes the last received trade. The global
    /// entry only moves forward on a strictly newer timestamp.
    pub fn record(&mut self, trade: TradeData) -> bool {
        let is_newer = self
            .global
            .as_ref()
            .map_or(true, |current| trade.timestamp > current.timestamp);

        if is_newer {
            self.global = Some(trade.clone());
        }
        self.by_symbol.insert(trade.symbol.clone(), trade);

        is_newer
    }

    pub fn get(&self, symbol: &str) -> Option<&TradeData> {
        self.by_symbol.get(symbol)
    }

    pub fn global(&self) -> Option<&TradeData> {
        self.global.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty() && self.global.is_none()
    }

    /// Clear all state
    pub fn reset(&mut self) {
        self.by_symbol.clear();
        self.global = None;
    }
}
