use super::publisher::Publisher;
use crate::domain::envelope::TaskEnvelope;
use crate::domain::order::{Amount, Order, StatusSummary};
use crate::domain::ports::OrderStoreRef;
use crate::error::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_LIST_LIMIT: usize = 100;

/// The order as stored, and whether its payment task reached the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedOrder {
    pub order: Order,
    /// `false` when the order was persisted but the publish failed. Such an
    /// order stays `pending` until something re-enqueues it.
    pub enqueued: bool,
}

/// Producer side: persists orders and enqueues one payment task per order.
pub struct OrderService {
    orders: OrderStoreRef,
    publisher: Arc<Publisher>,
}

impl OrderService {
    pub fn new(orders: OrderStoreRef, publisher: Arc<Publisher>) -> Self {
        Self { orders, publisher }
    }

    pub async fn submit(
        &self,
        customer_id: impl Into<String>,
        items: Vec<String>,
        total: Decimal,
    ) -> Result<SubmittedOrder> {
        let amount = Amount::new(total)?;
        let order = Order::new(customer_id, items, amount);
        self.orders.create(order.clone()).await?;

        let task = TaskEnvelope::new(order.id.clone(), order.total);
        let enqueued = match self.publisher.publish(&task).await {
            Ok(()) => {
                info!(order_id = %order.id, customer_id = %order.customer_id, total = %order.total, "Order created and queued");
                true
            }
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Order created but payment task was not queued");
                false
            }
        };
        Ok(SubmittedOrder { order, enqueued })
    }

    pub async fn get(&self, order_id: &str) -> Result<Option<Order>> {
        self.orders.get(order_id).await
    }

    /// Newest orders first; `None` means [`DEFAULT_LIST_LIMIT`].
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<Order>> {
        self.orders
            .list(limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await
    }

    /// Counts per status over every stored order.
    pub async fn summary(&self) -> Result<StatusSummary> {
        let orders = self.orders.list(usize::MAX).await?;
        Ok(StatusSummary::from_orders(&orders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::connection::BrokerConnection;
    use crate::config::DispatchConfig;
    use crate::domain::order::OrderStatus;
    use crate::domain::ports::OrderStore;
    use crate::error::DispatchError;
    use crate::infrastructure::in_memory::InMemoryOrderStore;
    use crate::infrastructure::memory_broker::InMemoryBroker;
    use rust_decimal_macros::dec;

    async fn service(broker: &InMemoryBroker) -> (OrderService, InMemoryOrderStore) {
        let connection = BrokerConnection::open(broker, "memory://", DispatchConfig::default())
            .await
            .unwrap();
        let store = InMemoryOrderStore::new();
        let service = OrderService::new(
            Arc::new(store.clone()),
            Arc::new(Publisher::new(&connection)),
        );
        (service, store)
    }

    #[tokio::test]
    async fn test_submit_persists_and_enqueues() {
        let broker = InMemoryBroker::new();
        let (service, _) = service(&broker).await;

        let submitted = service
            .submit("c1", vec!["book".into()], dec!(42.10))
            .await
            .unwrap();

        assert!(submitted.enqueued);
        assert_eq!(submitted.order.status, OrderStatus::Pending);
        let messages = broker.messages("orders").await;
        assert_eq!(messages.len(), 1);
        let task = TaskEnvelope::from_slice(&messages[0].body).unwrap();
        assert_eq!(task.order_id, submitted.order.id);
        assert_eq!(task.amount, dec!(42.10));
        assert_eq!(task.retry_count, 0);
    }

    #[tokio::test]
    async fn test_non_positive_total_is_rejected_before_persisting() {
        let broker = InMemoryBroker::new();
        let (service, store) = service(&broker).await;

        let result = service.submit("c1", vec![], dec!(0)).await;

        assert!(matches!(result, Err(DispatchError::ValidationError(_))));
        assert!(store.list(10).await.unwrap().is_empty());
        assert_eq!(broker.queue_depth("orders").await, 0);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_pending_order() {
        let broker = InMemoryBroker::new();
        let (service, _) = service(&broker).await;
        broker.fail_publishes(1).await;

        let submitted = service.submit("c1", vec![], dec!(10)).await.unwrap();

        assert!(!submitted.enqueued);
        let stored = service.get(&submitted.order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(broker.queue_depth("orders").await, 0);
    }

    #[tokio::test]
    async fn test_list_and_summary() {
        let broker = InMemoryBroker::new();
        let (service, store) = service(&broker).await;
        let mut ids = Vec::new();
        for i in 1..=3 {
            ids.push(service.submit(format!("c{i}"), vec![], dec!(1)).await.unwrap().order.id);
        }
        store
            .update_status(&ids[0], OrderStatus::Completed)
            .await
            .unwrap();

        let listed = service.list(Some(2)).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, ids[2]);
        assert_eq!(service.list(None).await.unwrap().len(), 3);

        let summary = service.summary().await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.pending, 2);
    }
}
