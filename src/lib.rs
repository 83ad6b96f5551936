//! NBBO Market Data - multi-venue order book aggregation and broadcast
//!
//! Polls several venues quoting the same asset, merges their books into one
//! synthetic book and streams it to subscribers. A second path follows the
//! upstream trade stream and republishes the latest trade.

use prometheus::Registry;
use std::sync::Arc;

pub mod config;
pub mod error;
pub mod feed;
pub mod hub;
pub mod observability;
pub mod orderbook;
pub mod parser;
pub mod server;
pub mod storage;
pub mod venue;

pub use config::Config;
pub use error::{MarketDataError, Result};
pub use feed::{LatestTrades, SharedLatestTrades, TradeData, TradeFeedManager, TradeSide};
pub use hub::{PriceBroadcaster, SubscriberSet};
pub use observability::Metrics;
pub use orderbook::{AggregatedOrderBook, AggregationEngine, OrderBook, OrderLevel, TopOfBook};
pub use storage::{
    Candle, InsertOutcome, PriceSnapshot, SnapshotQuery, SnapshotStore, AGGREGATED_VENUE,
};
pub use venue::{OrderBookSource, VenueClient};

/// Application state shared across components
pub struct AppState {
    pub config: Arc<Config>,
    pub venues: Arc<dyn OrderBookSource>,
    pub engine: AggregationEngine,
    pub store: Arc<SnapshotStore>,
    pub latest_trades: SharedLatestTrades,
    pub price_subscribers: Arc<SubscriberSet>,
    pub trade_subscribers: Arc<SubscriberSet>,
    pub registry: Registry,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, venues: Arc<dyn OrderBookSource>, store: SnapshotStore) -> Result<Self> {
        let registry = Registry::new();
        let metrics = Arc::new(Metrics::new(&registry)?);

        let price_subscribers = Arc::new(
            SubscriberSet::new("prices")
                .with_gauge(metrics.subscribers.with_label_values(&["prices"])),
        );
        let trade_subscribers = Arc::new(
            SubscriberSet::new("trades")
                .with_gauge(metrics.subscribers.with_label_values(&["trades"])),
        );

        Ok(Self {
            engine: AggregationEngine::new(&config.aggregate_symbol),
            config: Arc::new(config),
            venues,
            store: Arc::new(store),
            latest_trades: LatestTrades::shared(),
            price_subscribers,
            trade_subscribers,
            registry,
            metrics,
        })
    }

    /// Drop every streaming subscriber; returns how many were connected
    pub async fn drain_subscribers(&self) -> usize {
        self.price_subscribers.drain().await + self.trade_subscribers.drain().await
    }
}
