//! Exponential reconnect backoff.

use std::time::Duration;

/// Doubling delay with a cap, reset on success.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// The delay to wait before the next attempt. Each call doubles the
    /// subsequent delay up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// A successful connect resets the ladder.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
