use crate::domain::order::{Order, OrderStatus, Payment};
use crate::domain::ports::{OrderStore, PaymentStore};
use crate::error::{DispatchError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct OrderTable {
    orders: HashMap<String, Order>,
    // Insertion order, oldest first.
    sequence: Vec<String>,
}

/// A thread-safe in-memory store for orders.
///
/// Uses `Arc<RwLock<..>>` so clones share the same table; the CLI hands one
/// clone to the producer and another to the payment handler.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    table: Arc<RwLock<OrderTable>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: Order) -> Result<()> {
        let mut table = self.table.write().await;
        if table.orders.contains_key(&order.id) {
            return Err(DispatchError::Store(format!(
                "order {} already exists",
                order.id
            )));
        }
        table.sequence.push(order.id.clone());
        table.orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn update_status(&self, order_id: &str, status: OrderStatus) -> Result<()> {
        let mut table = self.table.write().await;
        let order = table
            .orders
            .get_mut(order_id)
            .ok_or_else(|| DispatchError::NotFound(format!("order {order_id}")))?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>> {
        let table = self.table.read().await;
        Ok(table.orders.get(order_id).cloned())
    }

    async fn list(&self, limit: usize) -> Result<Vec<Order>> {
        let table = self.table.read().await;
        Ok(table
            .sequence
            .iter()
            .rev()
            .filter_map(|id| table.orders.get(id).cloned())
            .take(limit)
            .collect())
    }
}

/// A thread-safe in-memory store for payment records, keyed by order.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<String, Vec<Payment>>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn record_attempt(&self, payment: Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        payments
            .entry(payment.order_id.clone())
            .or_default()
            .push(payment);
        Ok(())
    }

    async fn for_order(&self, order_id: &str) -> Result<Vec<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments.get(order_id).cloned().unwrap_or_default())
    }
}
