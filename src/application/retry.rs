use crate::config::DispatchConfig;
use std::time::Duration;

/// Quadratic backoff with a fixed retry ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_unit: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Republish with `retry_count = attempt` after waiting `delay`.
    Retry { attempt: u32, delay: Duration },
    /// Publish the advanced envelope to the DLQ and ack the original, so the
    /// dead copy carries `retry_count == max_retries`. Being a fresh publish,
    /// it has no broker `x-death` header.
    DeadLetter,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_unit: Duration) -> Self {
        Self {
            max_retries,
            backoff_unit,
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.max_retries, config.backoff_unit)
    }

    /// Decides what happens to a task whose handler failed on the delivery
    /// that carried `retry_count`.
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        let attempt = retry_count.saturating_add(1);
        if attempt >= self.max_retries {
            RetryDecision::DeadLetter
        } else {
            RetryDecision::Retry {
                attempt,
                delay: self.backoff(attempt),
            }
        }
    }

    /// Wait before the `attempt`-th retry: `attempt^2` backoff units.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(attempt.saturating_mul(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

/// What the consumer does with a delivery whose handler failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStrategy {
    /// Republish with backoff until the policy gives up, then dead-letter.
    Backoff(RetryPolicy),
    /// Reject with requeue; the broker hands the same message out again.
    Requeue,
}

impl Default for FailureStrategy {
    fn default() -> Self {
        Self::Backoff(RetryPolicy::default())
    }
}
