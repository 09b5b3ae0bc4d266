use super::topology::Topology;
use crate::config::DispatchConfig;
use crate::domain::ports::{Broker, Connector};
use crate::error::{BrokerError, DispatchError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// An open broker channel with its prefetch set and topology declared.
///
/// Owns the configuration the publisher and consumer are built from. Call
/// [`BrokerConnection::close`] on teardown.
pub struct BrokerConnection {
    broker: Arc<dyn Broker>,
    config: DispatchConfig,
}

impl BrokerConnection {
    /// Connects with bounded retries, sets the prefetch ceiling and declares
    /// the topology. Any failure after the connection is up closes it again.
    pub async fn open(
        connector: &dyn Connector,
        url: &str,
        config: DispatchConfig,
    ) -> Result<Self> {
        config.validate()?;
        let broker =
            connect_with_retry(connector, url, config.connect_attempts, config.connect_delay)
                .await?;

        if let Err(e) = broker.set_prefetch(config.prefetch).await {
            close_quietly(broker.as_ref()).await;
            return Err(DispatchError::Prefetch(e));
        }
        info!(prefetch = config.prefetch, "Prefetch limit set");

        let topology = Topology::new(&config.queue_name, &config.dlq_name);
        if let Err(e) = topology.declare(broker.as_ref()).await {
            close_quietly(broker.as_ref()).await;
            return Err(e);
        }

        Ok(Self { broker, config })
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub async fn close(&self) -> Result<()> {
        self.broker.close().await.map_err(DispatchError::Consumer)?;
        info!("Broker connection closed");
        Ok(())
    }
}

/// Tries to connect up to `attempts` times. After failed attempt `i` it waits
/// `i * delay` before trying again.
pub async fn connect_with_retry(
    connector: &dyn Connector,
    url: &str,
    attempts: u32,
    delay: Duration,
) -> Result<Arc<dyn Broker>> {
    let mut last_error = None;
    for attempt in 1..=attempts {
        match connector.connect(url).await {
            Ok(broker) => {
                info!(attempt, "Connected to broker");
                return Ok(broker);
            }
            Err(e) => {
                warn!(attempt, attempts, error = %e, "Failed to connect to broker");
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(delay.saturating_mul(attempt)).await;
                }
            }
        }
    }
    Err(DispatchError::Connection {
        attempts,
        source: last_error
            .unwrap_or_else(|| BrokerError::Unavailable("no connection attempts made".to_string())),
    })
}

async fn close_quietly(broker: &dyn Broker) {
    if let Err(e) = broker.close().await {
        warn!(error = %e, "Failed to close broker channel");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_broker::InMemoryBroker;
    use std::time::Duration;

    fn config() -> DispatchConfig {
        DispatchConfig::default().with_connect_retry(5, Duration::from_secs(2))
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_with_growing_delay() {
        let broker = InMemoryBroker::new();
        broker.refuse_connections(2).await;

        let started = tokio::time::Instant::now();
        let connection = BrokerConnection::open(&broker, "memory://", config())
            .await
            .unwrap();

        // 2s after the first failure, 4s after the second.
        assert_eq!(started.elapsed(), Duration::from_secs(6));
        assert_eq!(connection.config().prefetch, 10);
        assert_eq!(broker.open_channels().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_are_fatal() {
        let broker = InMemoryBroker::new();
        broker.refuse_connections(10).await;

        let result = BrokerConnection::open(&broker, "memory://", config()).await;
        assert!(matches!(
            result,
            Err(DispatchError::Connection { attempts: 5, .. })
        ));
        assert_eq!(broker.open_channels().await, 0);
    }

    #[tokio::test]
    async fn test_prefetch_failure_closes_channel() {
        let broker = InMemoryBroker::new();
        broker.fail_prefetch(true).await;

        let result = BrokerConnection::open(&broker, "memory://", config()).await;
        assert!(matches!(result, Err(DispatchError::Prefetch(_))));
        assert_eq!(broker.open_channels().await, 0);
    }

    #[tokio::test]
    async fn test_open_declares_topology() {
        let broker = InMemoryBroker::new();
        let connection = BrokerConnection::open(&broker, "memory://", config())
            .await
            .unwrap();

        assert_eq!(
            broker.declarations().await,
            vec!["orders_dlq".to_string(), "orders".to_string()]
        );
        connection.close().await.unwrap();
        assert_eq!(broker.open_channels().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_connecting() {
        let broker = InMemoryBroker::new();
        let result =
            BrokerConnection::open(&broker, "memory://", config().with_prefetch(0)).await;
        assert!(matches!(result, Err(DispatchError::ValidationError(_))));
        assert_eq!(broker.open_channels().await, 0);
    }
}
