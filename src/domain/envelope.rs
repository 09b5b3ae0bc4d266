use crate::error::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The unit of work moved through the broker.
///
/// Wire form is JSON: `{"order_id": "...", "amount": 50.0, "retry_count": 0}`.
/// `retry_count` defaults to 0 when absent and equals the number of failed
/// attempts that preceded the delivery carrying it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub order_id: String,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub amount: Decimal,
    #[serde(default)]
    pub retry_count: u32,
}

impl TaskEnvelope {
    pub fn new(order_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            order_id: order_id.into(),
            amount,
            retry_count: 0,
        }
    }

    /// The same task with its retry counter advanced by one.
    pub fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }
}
