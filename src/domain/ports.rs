use super::delivery::{DeliveryStream, Message, QueueSpec};
use super::envelope::TaskEnvelope;
use super::order::{Order, OrderStatus, Payment, PaymentOutcome};
use crate::error::{BrokerError, HandlerError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: Order) -> Result<()>;
    async fn update_status(&self, order_id: &str, status: OrderStatus) -> Result<()>;
    async fn get(&self, order_id: &str) -> Result<Option<Order>>;
    /// Most recently created orders first.
    async fn list(&self, limit: usize) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn record_attempt(&self, payment: Payment) -> Result<()>;
    async fn for_order(&self, order_id: &str) -> Result<Vec<Payment>>;
}

/// The external system that decides whether a charge goes through.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(
        &self,
        order_id: &str,
        amount: Decimal,
    ) -> std::result::Result<PaymentOutcome, HandlerError>;
}

/// Business logic run for every well-formed delivery.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &TaskEnvelope) -> std::result::Result<(), HandlerError>;
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Caps the number of unacknowledged deliveries held by this channel.
    async fn set_prefetch(&self, count: u16) -> std::result::Result<(), BrokerError>;
    async fn declare_queue(&self, spec: &QueueSpec) -> std::result::Result<(), BrokerError>;
    async fn publish(&self, queue: &str, message: Message)
    -> std::result::Result<(), BrokerError>;
    /// Starts a manual-acknowledgement consumer on `queue`.
    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> std::result::Result<DeliveryStream, BrokerError>;
    async fn close(&self) -> std::result::Result<(), BrokerError>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> std::result::Result<Arc<dyn Broker>, BrokerError>;
}

pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type TaskHandlerRef = Arc<dyn TaskHandler>;

/// Adapts an async closure into a [`TaskHandler`].
pub struct HandlerFn<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(TaskEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), HandlerError>> + Send,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> TaskHandler for HandlerFn<F>
where
    F: Fn(TaskEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), HandlerError>> + Send,
{
    async fn handle(&self, task: &TaskEnvelope) -> std::result::Result<(), HandlerError> {
        (self.0)(task.clone()).await
    }
}
