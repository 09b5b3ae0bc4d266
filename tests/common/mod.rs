#![allow(dead_code)]

use paydispatch::application::connection::BrokerConnection;
use paydispatch::application::consumer::Consumer;
use paydispatch::application::publisher::Publisher;
use paydispatch::application::retry::FailureStrategy;
use paydispatch::config::DispatchConfig;
use paydispatch::domain::envelope::TaskEnvelope;
use paydispatch::domain::ports::TaskHandlerRef;
use paydispatch::error::Result;
use paydispatch::infrastructure::memory_broker::InMemoryBroker;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub const QUEUE: &str = "orders";
pub const DLQ: &str = "orders_dlq";

/// A consumer running against an in-memory broker.
pub struct Harness {
    pub connection: BrokerConnection,
    pub publisher: Arc<Publisher>,
    pub cancel: CancellationToken,
    pub in_flight: TaskTracker,
    pub dead_lettered: Arc<AtomicUsize>,
    pub task: JoinHandle<Result<()>>,
}

pub fn config() -> DispatchConfig {
    DispatchConfig::new(QUEUE).with_backoff_unit(Duration::from_secs(1))
}

pub async fn connect(broker: &InMemoryBroker, config: DispatchConfig) -> BrokerConnection {
    BrokerConnection::open(broker, "memory://test", config)
        .await
        .unwrap()
}

pub async fn start(
    broker: &InMemoryBroker,
    config: DispatchConfig,
    handler: TaskHandlerRef,
) -> Harness {
    start_with(broker, config, handler, None).await
}

pub async fn start_with(
    broker: &InMemoryBroker,
    config: DispatchConfig,
    handler: TaskHandlerRef,
    strategy: Option<FailureStrategy>,
) -> Harness {
    let connection = connect(broker, config).await;
    let publisher = Arc::new(Publisher::new(&connection));
    let mut consumer = Consumer::new(&connection, publisher.clone(), handler);
    if let Some(strategy) = strategy {
        consumer = consumer.with_strategy(strategy);
    }
    let in_flight = consumer.in_flight();
    let dead_lettered = consumer.dead_lettered();
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { consumer.run(cancel).await }
    });
    Harness {
        connection,
        publisher,
        cancel,
        in_flight,
        dead_lettered,
        task,
    }
}

pub fn envelopes_in(messages: &[paydispatch::domain::delivery::Message]) -> Vec<TaskEnvelope> {
    messages
        .iter()
        .map(|m| TaskEnvelope::from_slice(&m.body).unwrap())
        .collect()
}

/// Polls `condition` until it holds, failing the test after a minute of
/// (possibly paused) time.
pub async fn wait_for<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Tracks how many handlers run at once.
#[derive(Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

impl Gauge {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}
