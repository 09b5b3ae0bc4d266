use crate::error::DispatchError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Represents a positive monetary amount for an order.
///
/// The producer validates totals through this type before anything is
/// persisted or enqueued. The queue layer carries the raw decimal and does
/// not re-validate it.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, DispatchError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(DispatchError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = DispatchError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Lifecycle of an order: `pending -> processing -> {completed | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order as held by the order store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    pub items: Vec<String>,
    pub total: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new `pending` order with a fresh identifier.
    pub fn new(customer_id: impl Into<String>, items: Vec<String>, total: Amount) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.into(),
            items,
            total: total.value(),
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of a single charge against the payment gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Success,
    Failed,
}

impl PaymentOutcome {
    /// The terminal order status this outcome resolves to.
    pub fn order_status(&self) -> OrderStatus {
        match self {
            Self::Success => OrderStatus::Completed,
            Self::Failed => OrderStatus::Failed,
        }
    }
}

impl fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// A recorded payment attempt, written once per terminal resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub amount: Decimal,
    pub outcome: PaymentOutcome,
    pub processed_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(order_id: impl Into<String>, amount: Decimal, outcome: PaymentOutcome) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.into(),
            amount,
            outcome,
            processed_at: Utc::now(),
        }
    }
}

/// Order counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusSummary {
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Self {
        orders
            .into_iter()
            .fold(Self::default(), |mut summary, order| {
                summary.total += 1;
                match order.status {
                    OrderStatus::Pending => summary.pending += 1,
                    OrderStatus::Processing => summary.processing += 1,
                    OrderStatus::Completed => summary.completed += 1,
                    OrderStatus::Failed => summary.failed += 1,
                }
                summary
            })
    }

    /// Orders that have not reached a terminal status yet.
    pub fn unresolved(&self) -> usize {
        self.pending + self.processing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(DispatchError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(DispatchError::ValidationError(_))
        ));
    }

    #[test]
    fn test_new_order_is_pending() {
        let order = Order::new("c1", vec!["book".into()], Amount::new(dec!(12.5)).unwrap());
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, dec!(12.5));
        assert!(!order.id.is_empty());
    }

    #[test]
    fn test_order_ids_are_unique() {
        let amount = Amount::new(dec!(1)).unwrap();
        let a = Order::new("c1", vec![], amount);
        let b = Order::new("c1", vec![], amount);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&OrderStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        assert_eq!(PaymentOutcome::Success.to_string(), "success");
    }

    #[test]
    fn test_summary_counts() {
        let amount = Amount::new(dec!(5)).unwrap();
        let mut orders: Vec<Order> = (0..4).map(|_| Order::new("c", vec![], amount)).collect();
        orders[1].status = OrderStatus::Processing;
        orders[2].status = OrderStatus::Completed;
        orders[3].status = OrderStatus::Failed;

        let summary = StatusSummary::from_orders(&orders);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.unresolved(), 2);
    }
}
