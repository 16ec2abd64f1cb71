//! Backoff schedule for resuming a channel that dropped mid-session.
//!
//! This schedule is never used for a failed initial handshake; that path
//! retries once per [`DEFAULT_HANDSHAKE_RETRY_DELAY`] (see
//! [`ClientConfig::handshake_retry_delay`](crate::config::ClientConfig)).

use std::time::Duration;

/// Delays before reconnect attempts 1..=4; the last one repeats afterwards.
pub const DEFAULT_RECONNECT_DELAYS_MS: [u64; 4] = [0, 2_000, 10_000, 30_000];

/// Fixed delay before retrying a failed handshake.
pub const DEFAULT_HANDSHAKE_RETRY_DELAY: Duration = Duration::from_millis(5_000);

/// Stateless mapping from "attempt number" to "how long to wait first".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectionPolicy {
    delays: Vec<Duration>,
    /// `None` means keep trying with the last delay forever.
    max_attempts: Option<u32>,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self::from_millis(&DEFAULT_RECONNECT_DELAYS_MS)
    }
}

impl ReconnectionPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self {
            delays,
            max_attempts: None,
        }
    }

    pub fn from_millis(delays: &[u64]) -> Self {
        Self::new(delays.iter().copied().map(Duration::from_millis).collect())
    }

    /// Give up (and report `Disconnected`) after this many failed attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Delay before the zero-based `attempt`, or `None` once the budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }
        let delay = self
            .delays
            .get(attempt as usize)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO);
        Some(delay)
    }
}
