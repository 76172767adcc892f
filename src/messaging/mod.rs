//! # Messaging
//!
//! Broker plumbing in both directions:
//!
//! - inbound: [`ConsumptionEngine`] keeps the request subscription alive and
//!   feeds decoded [`Envelope`]s into a bounded delivery queue
//! - outbound: [`BrokerPublisher`] announces domain events on the output
//!   exchange
//!
//! Both sit on the [`BrokerTransport`] / [`BrokerChannel`] traits so the
//! RabbitMQ transport can be swapped for the in-memory broker in tests.

pub mod consumer;
pub mod envelope;
pub mod errors;
pub mod providers;
pub mod publisher;
pub mod transport;

pub use consumer::{ConsumptionEngine, DeliveryOutcome, EngineConfig, EngineState, EngineStats};
pub use envelope::Envelope;
pub use errors::{MessagingError, MessagingResult};
pub use providers::{InMemoryBroker, RabbitMqTransport};
pub use publisher::{BrokerPublisher, NotificationGateway};
pub use transport::{BrokerChannel, BrokerTransport, DeliveryStream};
