//! # Broker Transport Traits
//!
//! Provider-agnostic broker primitives used by the consumption engine and
//! the notification publisher. A [`BrokerTransport`] dials connections; each
//! connection is exposed as a [`BrokerChannel`] carrying topology, publish
//! and consume operations.
//!
//! All exchanges are direct and durable, all queues durable. Consumption is
//! auto-acknowledged: a delivery is considered handled once it is read.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::errors::MessagingResult;

/// Stream of raw delivery bodies; ends or yields an error when the
/// underlying connection is lost
pub type DeliveryStream = BoxStream<'static, MessagingResult<Vec<u8>>>;

/// Dials new broker connections
#[async_trait]
pub trait BrokerTransport: Send + Sync + 'static {
    /// Open a fresh connection and channel
    async fn connect(&self) -> MessagingResult<Arc<dyn BrokerChannel>>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// One live broker connection
#[async_trait]
pub trait BrokerChannel: Send + Sync + 'static {
    /// Cheap, non-blocking liveness check of the underlying connection
    fn is_connected(&self) -> bool;

    /// Declare a durable direct exchange (idempotent)
    async fn declare_exchange(&self, exchange: &str) -> MessagingResult<()>;

    /// Declare a durable queue (idempotent)
    async fn declare_queue(&self, queue: &str) -> MessagingResult<()>;

    /// Bind `queue` to `exchange` for `routing_key` (idempotent)
    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> MessagingResult<()>;

    /// Start an auto-acknowledged consumer on `queue`
    async fn consume(&self, queue: &str) -> MessagingResult<DeliveryStream>;

    /// Publish `body` to `exchange` with `routing_key`
    async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> MessagingResult<()>;

    /// Close the connection; closing twice is not an error
    async fn close(&self) -> MessagingResult<()>;
}
