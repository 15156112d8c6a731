//! Reconnection backoff for broker connection failures.
//!
//! When the MQTT broker becomes unreachable the transport waits a fixed
//! interval between attempts instead of hammering it.

use std::time::Duration;

/// Delay between reconnection attempts when none is configured.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Reconnection state: the fixed delay and the current failure streak.
#[derive(Debug)]
pub struct ReconnectState {
    delay: Duration,
    consecutive_failures: u32,
}

impl ReconnectState {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            consecutive_failures: 0,
        }
    }

    /// Record a failed attempt.
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Record a successful connection and reset the streak.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Number of consecutive failed attempts.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Delay before the next attempt.
    pub fn current_delay(&self) -> Duration {
        self.delay
    }
}

impl Default for ReconnectState {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}
