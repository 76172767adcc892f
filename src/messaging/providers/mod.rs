//! # Broker Transport Providers
//!
//! - [`RabbitMqTransport`] - AMQP 0.9.1 via the lapin crate
//! - [`InMemoryBroker`] - process-local broker for tests and local runs

mod in_memory;
mod rabbitmq;

pub use in_memory::{BrokerOp, InMemoryBroker, InMemoryChannel, PublishedMessage};
pub use rabbitmq::{RabbitMqChannel, RabbitMqTransport};
