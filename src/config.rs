//! Mailbox configuration

use crate::poll::DEFAULT_POLL_INTERVAL;
use std::time::Duration;

/// Default payload capacity (1MB)
pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

/// Mailbox configuration
///
/// The owner and every attacher must agree on `capacity`; it is not stored in
/// the region.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// Maximum serialized payload size in bytes (header excluded)
    pub capacity: usize,
    /// Sleep between checks while waiting for a new value
    pub poll_interval: Duration,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl MailboxConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}
