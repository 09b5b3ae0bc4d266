use super::connection::BrokerConnection;
use crate::domain::delivery::Message;
use crate::domain::envelope::TaskEnvelope;
use crate::domain::ports::Broker;
use crate::error::{DispatchError, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Publishes task envelopes as persistent JSON messages.
///
/// The producer path and every retrying consumer task share one publisher;
/// publishes on the shared channel are serialized through an internal lock.
/// Nothing is retried here.
pub struct Publisher {
    broker: Arc<dyn Broker>,
    queue: String,
    dlq: String,
    lock: Mutex<()>,
}

impl Publisher {
    pub fn new(connection: &BrokerConnection) -> Self {
        let config = connection.config();
        Self {
            broker: connection.broker().clone(),
            queue: config.queue_name.clone(),
            dlq: config.dlq_name.clone(),
            lock: Mutex::new(()),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Enqueues `envelope` on the main queue.
    pub async fn publish(&self, envelope: &TaskEnvelope) -> Result<()> {
        self.publish_to(&self.queue, envelope).await
    }

    /// Places `envelope` directly on the dead-letter queue.
    pub async fn publish_dead_letter(&self, envelope: &TaskEnvelope) -> Result<()> {
        self.publish_to(&self.dlq, envelope).await
    }

    async fn publish_to(&self, queue: &str, envelope: &TaskEnvelope) -> Result<()> {
        let body = envelope.to_vec()?;
        let _guard = self.lock.lock().await;
        self.broker
            .publish(queue, Message::persistent_json(body))
            .await
            .map_err(|source| DispatchError::Publish {
                queue: queue.to_string(),
                source,
            })?;
        debug!(queue, order_id = %envelope.order_id, retry_count = envelope.retry_count, "Published task");
        Ok(())
    }
}
