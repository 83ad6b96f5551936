//! Periodic trade heartbeat

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use super::SharedLatestTrades;
use crate::hub::{SubscriberSet, TradeFrame};

/// Push the current global latest trade to every trade subscriber
///
/// Returns the number of subscribers reached, or `None` when nothing was sent.
pub async fn beat(latest: &SharedLatestTrades, subscribers: &SubscriberSet) -> Option<usize> {
    if subscribers.is_empty().await {
        return None;
    }

    let Some(trade) = latest.read().await.global().cloned() else {
        info!("No trade data available for periodic update");
        return None;
    };

    match subscribers.publish(&TradeFrame::for_trade(&trade)).await {
        Ok(delivered) => {
            debug!(symbol = %trade.symbol, delivered, "Sent trade heartbeat");
            Some(delivered)
        }
        Err(e) => {
            warn!(error = %e, "Failed to send trade heartbeat");
            None
        }
    }
}

/// Run `beat` every `period`, first tick one period after start
pub async fn run_heartbeat(
    latest: SharedLatestTrades,
    subscribers: Arc<SubscriberSet>,
    period: Duration,
) {
    info!(period_secs = period.as_secs(), "Starting trade heartbeat");

    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        beat(&latest, &subscribers).await;
    }
}
