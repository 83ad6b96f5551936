//! Prometheus metrics for the broadcast and feed paths

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::error::{MarketDataError, Result};

/// Counters and gauges shared by the background tasks
#[derive(Clone)]
pub struct Metrics {
    /// Broadcast cycles by outcome (fresh, stale, skipped)
    pub broadcast_cycles: IntCounterVec,

    /// Venue fetch or parse failures by symbol
    pub venue_failures: IntCounterVec,

    /// Trades accepted from the upstream feed
    pub trades_processed: IntCounter,

    /// Upstream feed reconnection attempts
    pub feed_reconnects: IntCounter,

    /// Live subscribers by channel (prices, trades)
    pub subscribers: IntGaugeVec,
}

impl Metrics {
    /// Create the metric families and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self> {
        let broadcast_cycles = IntCounterVec::new(
            Opts::new("broadcast_cycles_total", "Aggregated order book broadcast cycles"),
            &["outcome"],
        )?;
        let venue_failures = IntCounterVec::new(
            Opts::new("venue_failures_total", "Venue order book fetch failures"),
            &["symbol"],
        )?;
        let trades_processed =
            IntCounter::new("trades_processed_total", "Trades accepted from the upstream feed")?;
        let feed_reconnects =
            IntCounter::new("feed_reconnects_total", "Upstream trade feed reconnection attempts")?;
        let subscribers = IntGaugeVec::new(
            Opts::new("subscribers", "Live streaming subscribers"),
            &["channel"],
        )?;

        registry.register(Box::new(broadcast_cycles.clone()))?;
        registry.register(Box::new(venue_failures.clone()))?;
        registry.register(Box::new(trades_processed.clone()))?;
        registry.register(Box::new(feed_reconnects.clone()))?;
        registry.register(Box::new(subscribers.clone()))?;

        Ok(Self {
            broadcast_cycles,
            venue_failures,
            trades_processed,
            feed_reconnects,
            subscribers,
        })
    }

    /// Metrics bound to a throwaway registry
    #[cfg(test)]
    pub(crate) fn for_tests() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::new(&Registry::new()).unwrap())
    }
}

/// Render a registry in the Prometheus text format
pub fn render(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| MarketDataError::MetricsError(e.to_string()))
}
