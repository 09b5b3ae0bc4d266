//! RabbitMQ adapter over AMQP 0-9-1, built on `lapin`.

use crate::domain::delivery::{Acknowledger, Delivery, DeliveryStream, Message, QueueSpec};
use crate::domain::ports::{Broker, Connector};
use crate::error::BrokerError;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions, ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::debug;

const PERSISTENT_DELIVERY_MODE: u8 = 2;
const REPLY_SUCCESS: u16 = 200;

/// Opens one connection and one confirm-mode channel per `connect` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmqpConnector;

#[async_trait]
impl Connector for AmqpConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn Broker>, BrokerError> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        debug!(channel = channel.id(), "AMQP channel opened");
        Ok(Arc::new(AmqpBroker {
            connection,
            channel,
        }))
    }
}

pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
}

fn queue_arguments(spec: &QueueSpec) -> FieldTable {
    let mut args = FieldTable::default();
    if let Some(target) = &spec.dead_letter_target {
        // Default exchange, routed straight to the target queue by name.
        args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString("".into()),
        );
        args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(target.as_str().into()),
        );
    }
    args
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        self.channel
            .basic_qos(count, BasicQosOptions::default())
            .await?;
        Ok(())
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError> {
        let options = QueueDeclareOptions {
            durable: spec.durable,
            ..QueueDeclareOptions::default()
        };
        self.channel
            .queue_declare(&spec.name, options, queue_arguments(spec))
            .await?;
        Ok(())
    }

    async fn publish(&self, queue: &str, message: Message) -> Result<(), BrokerError> {
        let mut properties = BasicProperties::default();
        if message.persistent {
            properties = properties.with_delivery_mode(PERSISTENT_DELIVERY_MODE);
        }
        if let Some(content_type) = &message.content_type {
            properties = properties.with_content_type(content_type.as_str().into());
        }

        let confirmation = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await?
            .await?;
        if confirmation.is_nack() {
            return Err(BrokerError::Unavailable(format!(
                "broker refused message for '{queue}'"
            )));
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, BrokerError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        let stream = consumer.map(|next| -> Result<Delivery, BrokerError> {
            let delivery = next?;
            let content_type = delivery
                .properties
                .content_type()
                .as_ref()
                .map(|ct| ct.as_str().to_string());
            Ok(Delivery::new(
                delivery.delivery_tag,
                delivery.data,
                content_type,
                delivery.redelivered,
                Box::new(AmqpAcker(delivery.acker)),
            ))
        });
        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.channel.close(REPLY_SUCCESS, "OK").await?;
        self.connection.close(REPLY_SUCCESS, "OK").await?;
        Ok(())
    }
}

struct AmqpAcker(Acker);

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.0.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> Result<(), BrokerError> {
        self.0.reject(BasicRejectOptions { requeue }).await?;
        Ok(())
    }
}
