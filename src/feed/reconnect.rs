//! Reconnection policy for the upstream trade feed

use std::time::Duration;

/// Decides how long to wait before the next connection attempt
pub trait ReconnectPolicy: Send {
    /// Delay before the next attempt, or `None` to stop reconnecting
    fn next_delay(&mut self) -> Option<Duration>;

    /// Called once a connection is established
    fn reset(&mut self);

    /// Attempts since the last successful connection
    fn attempts(&self) -> u32;
}

/// Same delay every time, retrying forever
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    attempts: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay, attempts: 0 }
    }
}

impl ReconnectPolicy for FixedDelay {
    fn next_delay(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        Some(self.delay)
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}
