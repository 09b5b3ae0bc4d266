use crate::domain::delivery::QueueSpec;
use crate::domain::ports::Broker;
use crate::error::{DispatchError, Result};
use tracing::info;

/// The two durable queues the dispatcher works against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub main: QueueSpec,
    pub dead_letter: QueueSpec,
}

impl Topology {
    pub fn new(main_queue: &str, dlq: &str) -> Self {
        Self {
            main: QueueSpec::durable(main_queue).with_dead_letter(dlq),
            dead_letter: QueueSpec::durable(dlq),
        }
    }

    /// Declares the dead-letter queue first so the main queue never refers to
    /// a target that does not exist yet.
    pub async fn declare(&self, broker: &dyn Broker) -> Result<()> {
        for spec in [&self.dead_letter, &self.main] {
            broker
                .declare_queue(spec)
                .await
                .map_err(|source| DispatchError::Topology {
                    queue: spec.name.clone(),
                    source,
                })?;
            match &spec.dead_letter_target {
                Some(target) => info!(queue = %spec.name, dead_letter = %target, "Main queue configured"),
                None => info!(queue = %spec.name, "Dead-letter queue declared"),
            }
        }
        Ok(())
    }
}

pub async fn declare(broker: &dyn Broker, main_queue: &str, dlq: &str) -> Result<()> {
    Topology::new(main_queue, dlq).declare(broker).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Connector;
    use crate::error::BrokerError;
    use crate::infrastructure::memory_broker::InMemoryBroker;

    #[tokio::test]
    async fn test_dlq_declared_before_main_queue() {
        let broker = InMemoryBroker::new();
        let channel = broker.connect("memory://").await.unwrap();

        declare(channel.as_ref(), "orders", "orders_dlq").await.unwrap();

        assert_eq!(
            broker.declarations().await,
            vec!["orders_dlq".to_string(), "orders".to_string()]
        );
    }

    #[tokio::test]
    async fn test_redeclare_is_noop() {
        let broker = InMemoryBroker::new();
        let channel = broker.connect("memory://").await.unwrap();

        declare(channel.as_ref(), "orders", "orders_dlq").await.unwrap();
        declare(channel.as_ref(), "orders", "orders_dlq").await.unwrap();
        assert_eq!(broker.declarations().await.len(), 2);
    }

    #[tokio::test]
    async fn test_conflicting_declaration_is_topology_error() {
        let broker = InMemoryBroker::new();
        let channel = broker.connect("memory://").await.unwrap();
        channel
            .declare_queue(&QueueSpec::durable("orders"))
            .await
            .unwrap();

        let result = declare(channel.as_ref(), "orders", "orders_dlq").await;
        match result {
            Err(DispatchError::Topology { queue, source }) => {
                assert_eq!(queue, "orders");
                assert!(matches!(source, BrokerError::PreconditionFailed(_)));
            }
            other => panic!("expected topology error, got {other:?}"),
        }
    }
}
