//! Periodic aggregated order book broadcast
//!
//! Each cycle fetches every configured venue, merges whatever answered and
//! pushes the result. When nothing answers, the last good aggregate is resent
//! as an `error` frame; before the first success the cycle is skipped.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::{CycleMetadata, PriceFrame, SubscriberSet};
use crate::error::MarketDataError;
use crate::observability::Metrics;
use crate::orderbook::{AggregatedOrderBook, AggregationEngine};
use crate::venue::{fetch_books, OrderBookSource};

/// What a cycle ended up sending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A fresh aggregate was pushed
    Fresh { delivered: usize },
    /// No venue answered; the last good aggregate was pushed as an error frame
    Stale { delivered: usize },
    /// No venue answered and there was nothing to fall back to
    Skipped,
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Fresh { .. } => "fresh",
            CycleOutcome::Stale { .. } => "stale",
            CycleOutcome::Skipped => "skipped",
        }
    }
}

/// Per-cycle success/failure report
#[derive(Debug)]
pub struct CycleReport {
    pub processed: Vec<String>,
    pub failures: Vec<MarketDataError>,
    pub outcome: CycleOutcome,
}

struct LastGood {
    book: AggregatedOrderBook,
    metadata: CycleMetadata,
}

/// Polls venues and pushes aggregated books to price subscribers
pub struct PriceBroadcaster {
    source: Arc<dyn OrderBookSource>,
    symbols: Vec<String>,
    engine: AggregationEngine,
    subscribers: Arc<SubscriberSet>,
    metrics: Arc<Metrics>,
    period: Duration,
    last_good: Option<LastGood>,
}

impl PriceBroadcaster {
    pub fn new(
        source: Arc<dyn OrderBookSource>,
        symbols: Vec<String>,
        engine: AggregationEngine,
        subscribers: Arc<SubscriberSet>,
        metrics: Arc<Metrics>,
        period: Duration,
    ) -> Self {
        Self {
            source,
            symbols,
            engine,
            subscribers,
            metrics,
            period,
            last_good: None,
        }
    }

    /// Last aggregate produced by a successful cycle
    pub fn last_good(&self) -> Option<&AggregatedOrderBook> {
        self.last_good.as_ref().map(|last| &last.book)
    }

    /// Run one fetch, merge and push cycle
    pub async fn run_cycle(&mut self) -> CycleReport {
        let fetch = fetch_books(self.source.as_ref(), &self.symbols).await;

        for failure in &fetch.failures {
            if let MarketDataError::VenueUnavailable { symbol, .. } = failure {
                self.metrics
                    .venue_failures
                    .with_label_values(&[symbol.as_str()])
                    .inc();
            }
        }

        let metadata = CycleMetadata {
            coins_processed: fetch.processed.len(),
            total_coins: self.symbols.len(),
        };

        let frame = match self.engine.aggregate(&fetch.books, &fetch.processed) {
            Ok(book) => {
                let frame = PriceFrame::fresh(book.clone(), metadata);
                self.last_good = Some(LastGood { book, metadata });
                Some(frame)
            }
            Err(e) => match &self.last_good {
                Some(last) => {
                    error!(error = %e, "No venue responded, sending last known aggregate");
                    Some(PriceFrame::stale(last.book.clone(), last.metadata))
                }
                None => {
                    info!(error = %e, "No order book data available and no previous data to send");
                    None
                }
            },
        };

        let outcome = match frame {
            Some(frame) => {
                let delivered = match self.subscribers.publish(&frame).await {
                    Ok(delivered) => delivered,
                    Err(e) => {
                        error!(error = %e, "Failed to publish price frame");
                        0
                    }
                };
                if frame.is_stale() {
                    CycleOutcome::Stale { delivered }
                } else {
                    CycleOutcome::Fresh { delivered }
                }
            }
            None => CycleOutcome::Skipped,
        };

        self.metrics
            .broadcast_cycles
            .with_label_values(&[outcome.label()])
            .inc();

        CycleReport {
            processed: fetch.processed,
            failures: fetch.failures,
            outcome,
        }
    }

    /// Run cycles forever, only while someone is subscribed
    ///
    /// Cycles never overlap; a slow cycle delays the next tick.
    pub async fn run(mut self) {
        info!(
            symbols = ?self.symbols,
            period_ms = self.period.as_millis() as u64,
            "Starting price broadcaster"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.subscribers.is_empty().await {
                continue;
            }

            let report = self.run_cycle().await;
            debug!(
                outcome = report.outcome.label(),
                processed = report.processed.len(),
                failed = report.failures.len(),
                "Broadcast cycle complete"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::MockOrderBookSource;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn venue_book(bid: &str, ask: &str) -> serde_json::Value {
        json!({
            "time": 1,
            "levels": [[{"px": bid, "sz": "1", "n": 1}], [{"px": ask, "sz": "2", "n": 1}]]
        })
    }

    fn broadcaster(source: MockOrderBookSource) -> (PriceBroadcaster, Arc<SubscriberSet>, Arc<Metrics>) {
        let subscribers = Arc::new(SubscriberSet::new("prices"));
        let metrics = Metrics::for_tests();
        let hub = PriceBroadcaster::new(
            Arc::new(source),
            vec!["merrli:BTC".to_string(), "sekaw:BTC".to_string()],
            AggregationEngine::new("BTC"),
            subscribers.clone(),
            metrics.clone(),
            Duration::from_millis(10),
        );
        (hub, subscribers, metrics)
    }

    async fn next_frame(receiver: &mut tokio::sync::mpsc::Receiver<String>) -> serde_json::Value {
        let message = receiver.recv().await.unwrap();
        serde_json::from_str(&message).unwrap()
    }

    #[tokio::test]
    async fn test_partial_failure_still_sends_fresh_frame() {
        let mut source = MockOrderBookSource::new();
        source.expect_fetch_l2_book().returning(|request| {
            if request.coin == "merrli:BTC" {
                Err(MarketDataError::RestApiError("503".to_string()))
            } else {
                Ok(venue_book("100", "101"))
            }
        });

        let (mut hub, subscribers, metrics) = broadcaster(source);
        let mut sub = subscribers.subscribe().await;

        let report = hub.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::Fresh { delivered: 1 });
        assert_eq!(report.processed, vec!["sekaw:BTC".to_string()]);
        assert_eq!(report.failures.len(), 1);

        let frame = next_frame(&mut sub.receiver).await;
        assert_eq!(frame["type"], "aggregated_order_book");
        assert_eq!(frame["metadata"]["coins_processed"], 1);
        assert_eq!(frame["metadata"]["total_coins"], 2);
        assert_eq!(frame["data"]["best_bid"], 100.0);
        assert_eq!(frame["data"]["sources"], json!(["sekaw:BTC"]));

        assert_eq!(
            metrics.venue_failures.with_label_values(&["merrli:BTC"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_total_failure_resends_last_good_as_error() {
        let healthy = Arc::new(AtomicBool::new(true));
        let flag = healthy.clone();

        let mut source = MockOrderBookSource::new();
        source.expect_fetch_l2_book().returning(move |_| {
            if flag.load(Ordering::SeqCst) {
                Ok(venue_book("100", "101"))
            } else {
                Err(MarketDataError::RestApiError("down".to_string()))
            }
        });

        let (mut hub, subscribers, _metrics) = broadcaster(source);
        let mut sub = subscribers.subscribe().await;

        hub.run_cycle().await;
        let good = next_frame(&mut sub.receiver).await;

        healthy.store(false, Ordering::SeqCst);
        let report = hub.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::Stale { delivered: 1 });
        assert!(report.processed.is_empty());

        let stale = next_frame(&mut sub.receiver).await;
        assert_eq!(stale["type"], "error");
        assert_eq!(stale["data"], good["data"]);
        assert_eq!(stale["metadata"], good["metadata"]);
    }

    #[tokio::test]
    async fn test_total_failure_without_history_is_skipped() {
        let mut source = MockOrderBookSource::new();
        source
            .expect_fetch_l2_book()
            .returning(|_| Err(MarketDataError::RestApiError("down".to_string())));

        let (mut hub, subscribers, metrics) = broadcaster(source);
        let mut sub = subscribers.subscribe().await;

        let report = hub.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::Skipped);
        assert!(hub.last_good().is_none());
        assert!(sub.receiver.try_recv().is_err());
        assert_eq!(
            metrics.broadcast_cycles.with_label_values(&["skipped"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_closed_subscriber_removed_during_cycle() {
        let mut source = MockOrderBookSource::new();
        source
            .expect_fetch_l2_book()
            .returning(|_| Ok(venue_book("100", "101")));

        let (mut hub, subscribers, _metrics) = broadcaster(source);
        let _alive = subscribers.subscribe().await;
        drop(subscribers.subscribe().await);

        let report = hub.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::Fresh { delivered: 1 });
        assert_eq!(subscribers.len().await, 1);
    }

    #[tokio::test]
    async fn test_run_idles_without_subscribers() {
        let mut source = MockOrderBookSource::new();
        source.expect_fetch_l2_book().never();

        let (hub, _subscribers, _metrics) = broadcaster(source);
        let task = tokio::spawn(hub.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();

        // A fetch would have panicked the task instead of leaving it cancellable
        let err = task.await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
