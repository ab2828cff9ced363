//! Client configuration.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Tuning knobs for a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Pause after a failed connection attempt before the next one.
    pub reconnect_delay: Duration,
    /// Upper bound of the random extra delay added to `reconnect_delay`,
    /// so many clients losing the same server do not retry in lockstep.
    pub reconnect_jitter: Duration,
    /// Capacity of the queue between callers and the connection owner.
    /// Callers wait for space when it is full.
    pub mailbox_size: usize,
    /// Messages read from the connection but not yet dispatched.
    pub inbound_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(1),
            reconnect_jitter: Duration::from_millis(250),
            mailbox_size: 64,
            inbound_buffer: 64,
        }
    }
}

impl ClientConfig {
    /// Clamp any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`Client::new`](crate::Client::new).
    /// Channel sizes must be at least 1 (tokio panics on 0).
    pub fn validated(mut self) -> Self {
        if self.mailbox_size == 0 {
            warn!("mailbox_size must be at least 1, using 1");
            self.mailbox_size = 1;
        }
        if self.inbound_buffer == 0 {
            warn!("inbound_buffer must be at least 1, using 1");
            self.inbound_buffer = 1;
        }
        self
    }

    /// How long to wait before the next connection attempt.
    pub(crate) fn backoff(&self) -> Duration {
        let max_jitter = self.reconnect_jitter.as_millis() as u64;
        let jitter = if max_jitter > 0 {
            rand::rng().random_range(0..=max_jitter)
        } else {
            0
        };
        self.reconnect_delay + Duration::from_millis(jitter)
    }
}
