//! # Notification Publisher
//!
//! Announces domain events on the output exchange. Each payload is wrapped in
//! a fresh [`Envelope`] whose `type` is the event name, and published with
//! the event name as routing key.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::envelope::Envelope;
use super::errors::{MessagingError, MessagingResult};
use super::transport::{BrokerChannel, BrokerTransport};
use crate::events::FormEvent;

/// Outbound domain-change notifications
#[async_trait]
pub trait NotificationGateway: Send + Sync + 'static {
    async fn publish(&self, payload: &serde_json::Value, event: FormEvent) -> MessagingResult<()>;

    async fn health_check(&self) -> MessagingResult<bool>;
}

/// [`NotificationGateway`] over a broker connection of its own.
///
/// The connection is opened lazily and re-opened on the next publish after a
/// connection loss; retrying is left to the caller.
pub struct BrokerPublisher {
    transport: Arc<dyn BrokerTransport>,
    exchange: String,
    channel: Mutex<Option<Arc<dyn BrokerChannel>>>,
}

impl std::fmt::Debug for BrokerPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerPublisher")
            .field("transport", &self.transport.name())
            .field("exchange", &self.exchange)
            .finish()
    }
}

impl BrokerPublisher {
    pub fn new(transport: Arc<dyn BrokerTransport>, exchange: impl Into<String>) -> Self {
        Self {
            transport,
            exchange: exchange.into(),
            channel: Mutex::new(None),
        }
    }

    /// Connect and declare the output exchange now instead of on first publish
    pub async fn connect(&self) -> MessagingResult<()> {
        self.live_channel().await.map(|_| ())
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    async fn live_channel(&self) -> MessagingResult<Arc<dyn BrokerChannel>> {
        let mut cached = self.channel.lock().await;
        if let Some(channel) = cached.as_ref() {
            if channel.is_connected() {
                return Ok(channel.clone());
            }
        }

        let channel = self.transport.connect().await?;
        channel.declare_exchange(&self.exchange).await?;
        info!(exchange = %self.exchange, "📣 Notification publisher connected");

        *cached = Some(channel.clone());
        Ok(channel)
    }

    pub async fn close(&self) -> MessagingResult<()> {
        match self.channel.lock().await.take() {
            Some(channel) => channel.close().await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NotificationGateway for BrokerPublisher {
    async fn publish(&self, payload: &serde_json::Value, event: FormEvent) -> MessagingResult<()> {
        let bytes = serde_json::to_vec(payload)
            .map_err(|e| MessagingError::message_serialization(e.to_string()))?;
        let envelope = Envelope::new(event.as_str(), bytes);
        let body = envelope.to_wire()?;

        let channel = self.live_channel().await?;
        if let Err(e) = channel.publish(&self.exchange, event.as_str(), &body).await {
            if e.is_connection_loss() {
                warn!(exchange = %self.exchange, error = %e, "Publisher connection lost");
                self.channel.lock().await.take();
            }
            return Err(e);
        }

        debug!(
            envelope_id = %envelope.id(),
            event = %event,
            exchange = %self.exchange,
            "Domain event published"
        );
        Ok(())
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        Ok(self
            .channel
            .lock()
            .await
            .as_ref()
            .is_some_and(|channel| channel.is_connected()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::providers::InMemoryBroker;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_wraps_payload_in_envelope() {
        let broker = InMemoryBroker::new();
        let publisher = BrokerPublisher::new(broker.transport(), "form.events");

        publisher
            .publish(&json!({"form_id": "f1"}), FormEvent::Deleted)
            .await
            .unwrap();

        let published = broker.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].exchange, "form.events");
        assert_eq!(published[0].routing_key, "form.deleted");

        let envelope = Envelope::from_wire(&published[0].body).unwrap();
        assert_eq!(envelope.envelope_type(), "form.deleted");
        let payload: serde_json::Value = envelope.payload_json().unwrap();
        assert_eq!(payload, json!({"form_id": "f1"}));
    }

    #[tokio::test]
    async fn test_each_publish_gets_a_fresh_envelope_id() {
        let broker = InMemoryBroker::new();
        let publisher = BrokerPublisher::new(broker.transport(), "form.events");

        publisher.publish(&json!({}), FormEvent::Updated).await.unwrap();
        publisher.publish(&json!({}), FormEvent::Updated).await.unwrap();

        let ids: Vec<String> = broker
            .published()
            .iter()
            .map(|m| Envelope::from_wire(&m.body).unwrap().id().to_string())
            .collect();
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn test_reconnects_after_connection_loss() {
        let broker = InMemoryBroker::new();
        let publisher = BrokerPublisher::new(broker.transport(), "form.events");
        publisher.connect().await.unwrap();
        assert!(publisher.health_check().await.unwrap());

        broker.drop_connections();
        assert!(!publisher.health_check().await.unwrap());

        publisher.publish(&json!({}), FormEvent::Created).await.unwrap();
        assert_eq!(broker.connection_count(), 2);
    }

    #[tokio::test]
    async fn test_publish_fails_while_broker_refuses() {
        let broker = InMemoryBroker::new();
        broker.refuse_connections(1);
        let publisher = BrokerPublisher::new(broker.transport(), "form.events");

        let err = publisher.publish(&json!({}), FormEvent::Created).await.unwrap_err();
        assert!(err.is_connection_loss());
        assert!(broker.published().is_empty());
    }
}
