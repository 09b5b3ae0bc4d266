use crate::error::{DispatchError, Result};
use std::time::Duration;

pub const DEFAULT_QUEUE_NAME: &str = "orders";
pub const DEFAULT_PREFETCH: u16 = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Settings shared by the connection manager, publisher and consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    pub queue_name: String,
    pub dlq_name: String,
    /// Broker prefetch and the consumer's concurrency ceiling.
    pub prefetch: u16,
    pub max_retries: u32,
    /// The k-th retry waits `k^2` of these.
    pub backoff_unit: Duration,
    pub shutdown_grace: Duration,
    pub connect_attempts: u32,
    /// Attempt `i` (1-based) sleeps `i * connect_delay` after failing.
    pub connect_delay: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_NAME)
    }
}

impl DispatchConfig {
    /// Creates a configuration for `queue_name`; the dead-letter queue is
    /// named `<queue_name>_dlq`.
    pub fn new(queue_name: impl Into<String>) -> Self {
        let queue_name = queue_name.into();
        Self {
            dlq_name: format!("{queue_name}_dlq"),
            queue_name,
            prefetch: DEFAULT_PREFETCH,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: Duration::from_secs(1),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            connect_attempts: 5,
            connect_delay: Duration::from_secs(2),
        }
    }

    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_connect_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.connect_attempts = attempts;
        self.connect_delay = delay;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_name.is_empty() || self.dlq_name.is_empty() {
            return Err(DispatchError::ValidationError(
                "queue names must not be empty".to_string(),
            ));
        }
        if self.queue_name == self.dlq_name {
            return Err(DispatchError::ValidationError(
                "dead-letter queue must differ from the main queue".to_string(),
            ));
        }
        if self.prefetch == 0 {
            return Err(DispatchError::ValidationError(
                "prefetch must be at least 1".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(DispatchError::ValidationError(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.connect_attempts == 0 {
            return Err(DispatchError::ValidationError(
                "connect_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
