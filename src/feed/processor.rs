//! Per-frame trade handling
//!
//! Decodes trade frames, filters by the configured symbol set, updates the
//! latest-trade cache and pushes new global records to subscribers.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::{SharedLatestTrades, TradeData};
use crate::error::{MarketDataError, Result};
use crate::hub::{SubscriberSet, TradeFrame};
use crate::observability::Metrics;
use crate::parser::{FeedMessage, RawTrade};

/// What one frame did to the cache
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameSummary {
    /// Trades recorded in the cache
    pub accepted: usize,
    /// Trades for symbols outside the configured set
    pub ignored: usize,
    /// Entries that failed to decode
    pub rejected: usize,
    /// Pushes triggered by a new global latest
    pub pushed: usize,
}

/// Applies trade frames to the shared cache
pub struct TradeProcessor {
    symbols: HashSet<String>,
    latest: SharedLatestTrades,
    subscribers: Arc<SubscriberSet>,
    metrics: Arc<Metrics>,
}

impl TradeProcessor {
    pub fn new(
        symbols: &[String],
        latest: SharedLatestTrades,
        subscribers: Arc<SubscriberSet>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            symbols: symbols.iter().cloned().collect(),
            latest,
            subscribers,
            metrics,
        }
    }

    /// Handle one raw frame
    ///
    /// An undecodable frame is an error and ends the connection. A single bad
    /// trade inside a decodable frame is skipped.
    pub async fn handle_frame(&self, raw: &str) -> Result<FrameSummary> {
        let entries = match FeedMessage::parse(raw)? {
            FeedMessage::Trades(entries) => entries,
            FeedMessage::Other(channel) => {
                trace!(channel = ?channel, "Ignoring non-trade frame");
                return Ok(FrameSummary::default());
            }
        };

        let mut summary = FrameSummary::default();
        for entry in entries {
            let trade = match serde_json::from_value::<RawTrade>(entry)
                .map_err(MarketDataError::from)
                .and_then(RawTrade::into_trade)
            {
                Ok(trade) => trade,
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable trade");
                    summary.rejected += 1;
                    continue;
                }
            };

            if !self.symbols.contains(&trade.symbol) {
                trace!(symbol = %trade.symbol, "Ignoring trade for unsubscribed symbol");
                summary.ignored += 1;
                continue;
            }

            summary.accepted += 1;
            if self.process_trade(trade).await {
                summary.pushed += 1;
            }
        }

        Ok(summary)
    }

    /// Record a trade; pushes it when it is the new global latest
    async fn process_trade(&self, trade: TradeData) -> bool {
        self.metrics.trades_processed.inc();

        let is_new_global = self.latest.write().await.record(trade.clone());
        if !is_new_global {
            return false;
        }

        debug!(
            symbol = %trade.symbol,
            price = %trade.price,
            timestamp = trade.timestamp,
            "New global latest trade"
        );

        match self.subscribers.publish(&TradeFrame::for_trade(&trade)).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Failed to push trade update");
                false
            }
        }
    }
}
