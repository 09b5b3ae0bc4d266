use crate::error::BrokerError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// An outgoing message and its publish properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    /// Broker must keep the message across a restart while it is unacknowledged.
    pub persistent: bool,
}

impl Message {
    pub fn persistent_json(body: Vec<u8>) -> Self {
        Self {
            body,
            content_type: Some(JSON_CONTENT_TYPE.to_string()),
            persistent: true,
        }
    }
}

/// Declaration arguments for a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    /// Queue that receives messages rejected without requeue.
    pub dead_letter_target: Option<String>,
}

impl QueueSpec {
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            dead_letter_target: None,
        }
    }

    pub fn with_dead_letter(mut self, target: impl Into<String>) -> Self {
        self.dead_letter_target = Some(target.into());
        self
    }
}

/// Broker-side handle used to settle a delivery.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), BrokerError>;
    async fn reject(&self, requeue: bool) -> Result<(), BrokerError>;
}

/// One received message.
///
/// `ack` and `reject` take the delivery by value, so a disposition can only
/// be chosen once.
pub struct Delivery {
    tag: u64,
    body: Vec<u8>,
    content_type: Option<String>,
    redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        tag: u64,
        body: Vec<u8>,
        content_type: Option<String>,
        redelivered: bool,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            tag,
            body,
            content_type,
            redelivered,
            acker,
        }
    }

    pub fn tag(&self) -> u64 {
        self.tag
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    /// Permanently removes the message from its queue.
    pub async fn ack(self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }

    /// Rejects the message. Without requeue the broker routes it to the
    /// queue's dead-letter target; with requeue it goes back to the queue.
    pub async fn reject(self, requeue: bool) -> Result<(), BrokerError> {
        self.acker.reject(requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("tag", &self.tag)
            .field("len", &self.body.len())
            .field("content_type", &self.content_type)
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

pub type DeliveryStream = BoxStream<'static, Result<Delivery, BrokerError>>;
