mod common;

use async_trait::async_trait;
use common::{DLQ, QUEUE, config, start, wait_for};
use paydispatch::application::orders::OrderService;
use paydispatch::application::payment::PaymentProcessor;
use paydispatch::domain::order::{OrderStatus, PaymentOutcome};
use paydispatch::domain::ports::{
    Connector, OrderStoreRef, PaymentGateway, PaymentGatewayRef, PaymentStore, PaymentStoreRef,
};
use paydispatch::error::HandlerError;
use paydispatch::infrastructure::in_memory::{InMemoryOrderStore, InMemoryPaymentStore};
use paydispatch::infrastructure::memory_broker::InMemoryBroker;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Times out on the first charge, approves every later one.
#[derive(Default)]
struct FlakyGateway {
    calls: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for FlakyGateway {
    async fn charge(&self, _order_id: &str, _amount: Decimal) -> Result<PaymentOutcome, HandlerError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(HandlerError::Gateway("timeout".to_string()))
        } else {
            Ok(PaymentOutcome::Success)
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_order_completes_after_transient_gateway_failure() {
    let broker = InMemoryBroker::new();
    let orders = InMemoryOrderStore::new();
    let payments = InMemoryPaymentStore::new();
    let gateway = Arc::new(FlakyGateway::default());

    let order_store: OrderStoreRef = Arc::new(orders.clone());
    let payment_store: PaymentStoreRef = Arc::new(payments.clone());
    let gateway_ref: PaymentGatewayRef = gateway.clone();
    let processor = PaymentProcessor::new(order_store.clone(), payment_store, gateway_ref);

    let harness = start(&broker, config(), Arc::new(processor)).await;
    let service = OrderService::new(order_store, harness.publisher.clone());

    let submitted = service
        .submit("alice", vec!["book".into()], dec!(50.0))
        .await
        .unwrap();
    assert!(submitted.enqueued);

    let id = submitted.order.id.clone();
    wait_for(|| async {
        service
            .get(&id)
            .await
            .unwrap()
            .is_some_and(|o| o.status.is_terminal())
    })
    .await;
    wait_for(|| async { broker.unacked_count(QUEUE).await == 0 }).await;

    let order = service.get(&id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 2);
    assert_eq!(payments.for_order(&id).await.unwrap().len(), 1);
    assert_eq!(broker.queue_depth(DLQ).await, 0);

    let summary = service.summary().await.unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.unresolved(), 0);
    harness.cancel.cancel();
}

#[tokio::test]
async fn test_connector_as_trait_object() {
    let broker = InMemoryBroker::new();
    let connector: Box<dyn Connector> = Box::new(broker.clone());

    // Verify Send + Sync by connecting from spawned tasks
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let connector = broker.clone();
            tokio::spawn(async move { connector.connect("memory://").await.is_ok() })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    let channel = connector.connect("memory://").await.unwrap();
    channel.set_prefetch(1).await.unwrap();
    assert_eq!(broker.open_channels().await, 4);
    channel.close().await.unwrap();
    assert_eq!(broker.open_channels().await, 3);
}
