use thiserror::Error;

/// Failures reported by a broker adapter.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("channel closed")]
    ChannelClosed,
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("unknown queue '{0}'")]
    UnknownQueue(String),
    #[cfg(feature = "broker-amqp")]
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("failed to connect to broker after {attempts} attempts: {source}")]
    Connection {
        attempts: u32,
        #[source]
        source: BrokerError,
    },
    #[error("failed to set prefetch limit: {0}")]
    Prefetch(#[source] BrokerError),
    #[error("failed to declare queue '{queue}': {source}")]
    Topology {
        queue: String,
        #[source]
        source: BrokerError,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to publish to '{queue}': {source}")]
    Publish {
        queue: String,
        #[source]
        source: BrokerError,
    },
    #[error("delivery stream for '{0}' closed unexpectedly")]
    StreamClosed(String),
    #[error("Consumer error: {0}")]
    Consumer(#[source] BrokerError),
    #[error("failed to republish order {order_id} for retry: {source}")]
    RepublishFailed {
        order_id: String,
        #[source]
        source: Box<DispatchError>,
    },
    #[error("Store error: {0}")]
    Store(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failure returned by a task handler. Every variant is treated as transient
/// and goes through the configured failure strategy.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("order store: {0}")]
    Store(#[source] DispatchError),
    #[error("payment gateway: {0}")]
    Gateway(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
