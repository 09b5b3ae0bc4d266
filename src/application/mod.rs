//! Application layer: broker connection lifecycle, publishing, the
//! concurrent consumer with its retry and shutdown policies, and the order
//! and payment services that sit on either side of the queue.

pub mod connection;
pub mod consumer;
pub mod orders;
pub mod payment;
pub mod publisher;
pub mod retry;
pub mod shutdown;
pub mod topology;
