//! Trade feed supervisor
//!
//! Drives the connection state machine and reconnects forever after any
//! listen failure.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::{ReconnectPolicy, TradeProcessor, TradeStreamClient};
use crate::error::{MarketDataError, Result};
use crate::observability::Metrics;

/// Idle time after which a keepalive ping is sent
const KEEPALIVE_AFTER: Duration = Duration::from_secs(30);
/// Read timeout used to detect stale connections
const RECV_TIMEOUT: Duration = Duration::from_secs(45);

/// Connection state of the upstream trade feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Subscribed,
    Listening,
}

/// Owns the trade stream connection and its reconnect loop
pub struct TradeFeedManager {
    client: TradeStreamClient,
    processor: TradeProcessor,
    policy: Box<dyn ReconnectPolicy>,
    symbols: Vec<String>,
    state: FeedState,
    metrics: Arc<Metrics>,
}

impl TradeFeedManager {
    pub fn new(
        client: TradeStreamClient,
        processor: TradeProcessor,
        policy: Box<dyn ReconnectPolicy>,
        symbols: Vec<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            client,
            processor,
            policy,
            symbols,
            state: FeedState::Disconnected,
            metrics,
        }
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    /// Run until the reconnect policy gives up
    pub async fn run(&mut self) -> Result<()> {
        info!(symbols = ?self.symbols, "Starting trade feed");

        loop {
            let err = match self.connect_and_listen().await {
                Ok(()) => MarketDataError::FeedDisconnected("listen loop ended".to_string()),
                Err(e) => e,
            };

            self.client.close().await;
            self.transition(FeedState::Disconnected);
            error!(error = %err, "Trade feed disconnected");

            let Some(delay) = self.policy.next_delay() else {
                error!(attempts = self.policy.attempts(), "Reconnect policy exhausted");
                return Err(err);
            };

            self.metrics.feed_reconnects.inc();
            warn!(
                attempt = self.policy.attempts(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to trade feed"
            );
            sleep(delay).await;
        }
    }

    /// One pass through Connecting, Subscribed and Listening
    async fn connect_and_listen(&mut self) -> Result<()> {
        self.transition(FeedState::Connecting);
        self.client.connect().await?;

        self.client.subscribe(&self.symbols).await?;
        self.transition(FeedState::Subscribed);
        self.policy.reset();

        self.transition(FeedState::Listening);
        self.listen().await
    }

    async fn listen(&mut self) -> Result<()> {
        let mut last_message = Instant::now();

        loop {
            match timeout(RECV_TIMEOUT, self.client.recv()).await {
                Ok(Ok(Some(text))) => {
                    last_message = Instant::now();
                    let summary = self.processor.handle_frame(&text).await?;
                    if summary.accepted > 0 {
                        debug!(
                            accepted = summary.accepted,
                            pushed = summary.pushed,
                            "Processed trade frame"
                        );
                    }
                }
                Ok(Ok(None)) => {
                    if last_message.elapsed() > KEEPALIVE_AFTER {
                        if let Err(e) = self.client.ping().await {
                            warn!(error = %e, "Failed to send keepalive ping");
                        }
                    }
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(
                        last_message_secs = last_message.elapsed().as_secs(),
                        "No message received within timeout, sending keepalive"
                    );
                    self.client.ping().await.map_err(|e| {
                        MarketDataError::FeedDisconnected(format!("keepalive failed: {}", e))
                    })?;
                }
            }
        }
    }

    fn transition(&mut self, next: FeedState) {
        debug!(from = ?self.state, to = ?next, "Trade feed state change");
        self.state = next;
    }
}
