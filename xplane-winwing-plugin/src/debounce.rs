//! Minimum-interval gate used for rate-limited retries and periodic resyncs.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debounce {
    min_interval: Duration,
    last:         Option<Instant>,
}

impl Debounce {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last: None }
    }

    /// `true` if the gate has never fired or `min_interval` has elapsed since
    /// it last did. Firing re-arms the gate at `now`.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Start the interval without firing.
    pub fn arm(&mut self, now: Instant) {
        self.last = Some(now);
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
