//! Adapters behind the domain ports: brokers, stores and the payment gateway.

#[cfg(feature = "broker-amqp")]
pub mod amqp;
pub mod gateway;
pub mod in_memory;
pub mod memory_broker;
