//! Live subscriber set for one streaming channel

use prometheus::IntGauge;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{MarketDataError, Result};

pub type SubscriberId = u64;

/// Frames a subscriber may fall behind by before it is dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Handle returned to a newly admitted subscriber
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<String>,
}

/// Set of live subscribers for one channel
///
/// Each subscriber owns the receiving half of a bounded queue; the connection
/// task forwards queued frames to its socket. A push fails when the receiver
/// is gone or the queue is full (a stalled reader), and either way the
/// subscriber is dropped from the set.
pub struct SubscriberSet {
    channel: &'static str,
    next_id: AtomicU64,
    senders: RwLock<HashMap<SubscriberId, mpsc::Sender<String>>>,
    capacity: usize,
    gauge: Option<IntGauge>,
}

impl SubscriberSet {
    pub fn new(channel: &'static str) -> Self {
        Self {
            channel,
            next_id: AtomicU64::new(1),
            senders: RwLock::new(HashMap::new()),
            capacity: DEFAULT_QUEUE_CAPACITY,
            gauge: None,
        }
    }

    /// Per-subscriber queue bound (at least one frame)
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Mirror the set size into a gauge
    pub fn with_gauge(mut self, gauge: IntGauge) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn channel(&self) -> &'static str {
        self.channel
    }

    /// Admit a subscriber; it only sees frames pushed from now on
    pub async fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);

        let mut senders = self.senders.write().await;
        senders.insert(id, tx);
        self.update_gauge(senders.len());

        info!(channel = self.channel, id, total = senders.len(), "Subscriber connected");
        Subscription { id, receiver: rx }
    }

    /// Remove a subscriber; returns false if it was already gone
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut senders = self.senders.write().await;
        let removed = senders.remove(&id).is_some();
        if removed {
            self.update_gauge(senders.len());
            info!(channel = self.channel, id, total = senders.len(), "Subscriber disconnected");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.senders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.senders.read().await.is_empty()
    }

    /// Queue a message for one subscriber
    pub async fn send_to(&self, id: SubscriberId, message: String) -> bool {
        let mut senders = self.senders.write().await;
        let Some(tx) = senders.get(&id) else {
            return false;
        };
        if tx.try_send(message).is_ok() {
            return true;
        }

        senders.remove(&id);
        debug!(channel = self.channel, id, "Removed unreachable subscriber");
        self.update_gauge(senders.len());
        false
    }

    /// Queue a message for every subscriber, dropping closed and stalled ones
    ///
    /// Returns the number of subscribers the message was delivered to.
    pub async fn broadcast(&self, message: &str) -> usize {
        let mut senders = self.senders.write().await;

        let mut closed = Vec::new();
        for (id, tx) in senders.iter() {
            match tx.try_send(message.to_string()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(channel = self.channel, id = *id, "Subscriber queue full, dropping");
                    closed.push(*id);
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in &closed {
            senders.remove(id);
            debug!(channel = self.channel, id, "Removed subscriber");
        }
        if !closed.is_empty() {
            self.update_gauge(senders.len());
        }

        senders.len()
    }

    /// Serialize a frame and broadcast it
    pub async fn publish<T: Serialize>(&self, frame: &T) -> Result<usize> {
        let message = serde_json::to_string(frame)
            .map_err(|e| MarketDataError::SerializationError(e.to_string()))?;
        Ok(self.broadcast(&message).await)
    }

    /// Remove every subscriber, closing their queues
    pub async fn drain(&self) -> usize {
        let mut senders = self.senders.write().await;
        let count = senders.len();
        senders.clear();
        self.update_gauge(0);

        info!(channel = self.channel, count, "Drained subscribers");
        count
    }

    fn update_gauge(&self, len: usize) {
        if let Some(gauge) = &self.gauge {
            gauge.set(len as i64);
        }
    }
}
