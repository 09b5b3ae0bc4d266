use crate::domain::order::PaymentOutcome;
use crate::domain::ports::PaymentGateway;
use crate::error::{DispatchError, HandlerError};
use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_APPROVAL_RATE: f64 = 0.8;
pub const DEFAULT_LATENCY: RangeInclusive<Duration> =
    Duration::from_millis(100)..=Duration::from_millis(500);

/// Stand-in for a card processor: sleeps for a random latency, then approves
/// the charge with probability `approval_rate`.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    approval_rate: f64,
    latency: RangeInclusive<Duration>,
}

impl SimulatedGateway {
    pub fn new(approval_rate: f64, latency: RangeInclusive<Duration>) -> Result<Self, DispatchError> {
        if !(0.0..=1.0).contains(&approval_rate) {
            return Err(DispatchError::ValidationError(format!(
                "approval rate must be within 0.0..=1.0, got {approval_rate}"
            )));
        }
        if latency.start() > latency.end() {
            return Err(DispatchError::ValidationError(
                "latency range is empty".to_string(),
            ));
        }
        Ok(Self {
            approval_rate,
            latency,
        })
    }

    fn sample(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let latency = if self.latency.start() == self.latency.end() {
            *self.latency.start()
        } else {
            rng.gen_range(self.latency.clone())
        };
        (latency, rng.gen_bool(self.approval_rate))
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self {
            approval_rate: DEFAULT_APPROVAL_RATE,
            latency: DEFAULT_LATENCY,
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, order_id: &str, amount: Decimal) -> Result<PaymentOutcome, HandlerError> {
        // ThreadRng is !Send; sample before the await point.
        let (latency, approved) = self.sample();
        tokio::time::sleep(latency).await;

        let outcome = if approved {
            PaymentOutcome::Success
        } else {
            PaymentOutcome::Failed
        };
        debug!(order_id, %amount, %outcome, latency_ms = latency.as_millis() as u64, "Gateway responded");
        Ok(outcome)
    }
}
