use super::connection::BrokerConnection;
use super::publisher::Publisher;
use super::retry::{FailureStrategy, RetryDecision, RetryPolicy};
use crate::domain::delivery::Delivery;
use crate::domain::envelope::TaskEnvelope;
use crate::domain::ports::{Broker, TaskHandlerRef};
use crate::error::{BrokerError, DispatchError, HandlerError, Result};
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

pub const CONSUMER_TAG: &str = "paydispatch-worker";

/// Pulls deliveries from the main queue and runs the handler on each one,
/// with at most `concurrency` handlers in flight.
///
/// The concurrency ceiling equals the broker prefetch, so the admission gate
/// and the broker's unacknowledged-message limit stay in step. A unit of the
/// gate is held until the delivery is fully settled, including any retry
/// backoff and republish.
pub struct Consumer {
    broker: Arc<dyn Broker>,
    publisher: Arc<Publisher>,
    handler: TaskHandlerRef,
    queue: String,
    concurrency: usize,
    strategy: FailureStrategy,
    tracker: TaskTracker,
    dead_lettered: Arc<AtomicUsize>,
}

impl Consumer {
    pub fn new(
        connection: &BrokerConnection,
        publisher: Arc<Publisher>,
        handler: TaskHandlerRef,
    ) -> Self {
        let config = connection.config();
        Self {
            broker: connection.broker().clone(),
            publisher,
            handler,
            queue: config.queue_name.clone(),
            concurrency: usize::from(config.prefetch),
            strategy: FailureStrategy::Backoff(RetryPolicy::from_config(config)),
            tracker: TaskTracker::new(),
            dead_lettered: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replaces the default backoff strategy.
    pub fn with_strategy(mut self, strategy: FailureStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// The group of admitted handler executions, for the shutdown coordinator.
    pub fn in_flight(&self) -> TaskTracker {
        self.tracker.clone()
    }

    /// Count of well-formed tasks that exhausted their retries. Malformed
    /// bodies are not counted.
    pub fn dead_lettered(&self) -> Arc<AtomicUsize> {
        self.dead_lettered.clone()
    }

    /// Runs the dispatch loop until `cancel` fires or the delivery stream ends.
    ///
    /// Cancellation stops admission only; handlers already running are left
    /// to finish. A closed stream is reported as [`DispatchError::StreamClosed`].
    /// If a retry republish fails, the loop cancels `cancel` and returns
    /// [`DispatchError::RepublishFailed`].
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut deliveries = self
            .broker
            .consume(&self.queue, CONSUMER_TAG)
            .await
            .map_err(DispatchError::Consumer)?;
        let gate = Arc::new(Semaphore::new(self.concurrency));
        let tasks = Arc::new(TaskProcessor {
            publisher: self.publisher.clone(),
            handler: self.handler.clone(),
            strategy: self.strategy,
            dead_lettered: self.dead_lettered.clone(),
            fatal: Mutex::new(None),
        });
        info!(queue = %self.queue, concurrency = self.concurrency, "Consumer started");

        let outcome = loop {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                permit = gate.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };

            let delivery = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => break Err(DispatchError::Consumer(e)),
                    None => {
                        warn!(queue = %self.queue, "Delivery stream closed, stopping consumer");
                        break Err(DispatchError::StreamClosed(self.queue.clone()));
                    }
                },
            };

            let tasks = tasks.clone();
            let cancel = cancel.clone();
            self.tracker.spawn(async move {
                tasks.process(delivery, &cancel).await;
                drop(permit);
            });
        };

        if cancel.is_cancelled() {
            info!(queue = %self.queue, "Context cancelled, stopped consuming");
        }
        if let Some(fatal) = tasks.fatal.lock().await.take() {
            return Err(fatal);
        }
        outcome
    }
}

struct TaskProcessor {
    publisher: Arc<Publisher>,
    handler: TaskHandlerRef,
    strategy: FailureStrategy,
    dead_lettered: Arc<AtomicUsize>,
    fatal: Mutex<Option<DispatchError>>,
}

impl TaskProcessor {
    async fn process(&self, delivery: Delivery, cancel: &CancellationToken) {
        let envelope = match TaskEnvelope::from_slice(delivery.body()) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(tag = delivery.tag(), error = %e, "Invalid message format, dead-lettering");
                settle(delivery.reject(false).await, "reject");
                return;
            }
        };

        info!(
            order_id = %envelope.order_id,
            retry_count = envelope.retry_count,
            redelivered = delivery.redelivered(),
            "Processing task"
        );

        match self.handler.handle(&envelope).await {
            Ok(()) => {
                settle(delivery.ack().await, "ack");
                info!(order_id = %envelope.order_id, "Successfully processed task");
            }
            Err(e) => self.on_failure(delivery, envelope, e, cancel).await,
        }
    }

    async fn on_failure(
        &self,
        delivery: Delivery,
        envelope: TaskEnvelope,
        failure: HandlerError,
        cancel: &CancellationToken,
    ) {
        let policy = match self.strategy {
            FailureStrategy::Requeue => {
                warn!(order_id = %envelope.order_id, error = %failure, "Task failed, requeueing");
                settle(delivery.reject(true).await, "requeue");
                return;
            }
            FailureStrategy::Backoff(policy) => policy,
        };

        let next = envelope.next_attempt();
        match policy.decide(envelope.retry_count) {
            RetryDecision::DeadLetter => {
                warn!(
                    order_id = %envelope.order_id,
                    retry_count = next.retry_count,
                    max_retries = policy.max_retries,
                    error = %failure,
                    "Max retries exceeded, sending to DLQ"
                );
                self.dead_lettered.fetch_add(1, Ordering::SeqCst);
                match self.publisher.publish_dead_letter(&next).await {
                    Ok(()) => settle(delivery.ack().await, "ack"),
                    Err(e) => {
                        // The broker still dead-letters the original body.
                        warn!(order_id = %envelope.order_id, error = %e, "Dead-letter publish failed, rejecting delivery");
                        settle(delivery.reject(false).await, "reject");
                    }
                }
            }
            RetryDecision::Retry { attempt, delay } => {
                warn!(
                    order_id = %envelope.order_id,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure,
                    "Task failed, retrying after backoff"
                );
                tokio::time::sleep(delay).await;

                match self.publisher.publish(&next).await {
                    Ok(()) => settle(delivery.ack().await, "ack"),
                    Err(e) => {
                        error!(
                            order_id = %envelope.order_id,
                            error = %e,
                            "Republish failed, leaving delivery unacknowledged and stopping consumer"
                        );
                        self.fatal
                            .lock()
                            .await
                            .get_or_insert(DispatchError::RepublishFailed {
                                order_id: envelope.order_id.clone(),
                                source: Box::new(e),
                            });
                        cancel.cancel();
                        drop(delivery);
                    }
                }
            }
        }
    }
}

fn settle(result: std::result::Result<(), BrokerError>, action: &str) {
    if let Err(e) = result {
        error!(action, error = %e, "Failed to settle delivery");
    }
}
