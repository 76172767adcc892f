//! # Broker Consumption Engine
//!
//! Keeps one long-lived subscription alive across connection loss and hands
//! decoded envelopes to the dispatcher through a bounded queue.
//!
//! ```text
//!            subscribe(exchange, key)
//!                      |
//!  Disconnected -> Connecting -> TopologyReady -> Consuming
//!        ^                                           |
//!        +------------- connection lost -------------+
//! ```
//!
//! ## Key Design Decisions
//!
//! 1. **One mutex region**: connecting, declaring topology and registering new
//!    bindings all run under the same async mutex. A caller that finds the
//!    engine disconnected while another reconnect is in flight waits for it
//!    and reuses its connection instead of dialing again.
//!
//! 2. **Drop-newest backpressure**: deliveries go out with `try_send()`. When
//!    the delivery queue is full the envelope is dropped and counted; the read
//!    loop never waits on the dispatcher.
//!
//! 3. **Auto-ack**: a delivery is acknowledged by the broker when read, so
//!    dropped and malformed envelopes are lost (at-most-once).

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::envelope::Envelope;
use super::errors::MessagingResult;
use super::transport::{BrokerChannel, BrokerTransport, DeliveryStream};
use crate::config::RabbitMqConfig;
use crate::constants::{DEFAULT_HEALTH_PROBE_INTERVAL, DEFAULT_RECONNECT_DELAY};

/// Lifecycle of the broker subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EngineState {
    Disconnected,
    Connecting,
    TopologyReady,
    Consuming,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Disconnected => "disconnected",
            EngineState::Connecting => "connecting",
            EngineState::TopologyReady => "topology_ready",
            EngineState::Consuming => "consuming",
        };
        f.write_str(name)
    }
}

/// Consumption settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Durable queue bound to every registered exchange
    pub queue: String,
    /// Pause after a failed reconnect attempt
    pub reconnect_delay: Duration,
    /// Interval of the connection probe while consuming
    pub health_probe_interval: Duration,
}

impl EngineConfig {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            health_probe_interval: DEFAULT_HEALTH_PROBE_INTERVAL,
        }
    }
}

impl From<&RabbitMqConfig> for EngineConfig {
    fn from(config: &RabbitMqConfig) -> Self {
        Self {
            queue: config.request_queue.clone(),
            reconnect_delay: config.reconnect_delay(),
            health_probe_interval: config.health_probe_interval(),
        }
    }
}

/// Snapshot of the engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub delivered: u64,
    pub dropped: u64,
    pub decode_failures: u64,
    /// Successful reconnections after a lost connection
    pub reconnects: u64,
}

#[derive(Debug, Default)]
struct AtomicStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
    decode_failures: AtomicU64,
    reconnects: AtomicU64,
}

/// What happened to a single raw delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Delivery queue full; envelope discarded
    Dropped,
    /// Body was not a valid envelope; discarded
    Malformed,
    /// The dispatcher side of the queue is gone
    ReceiverClosed,
}

enum LoopExit {
    Cancelled,
    ConnectionLost,
}

/// Registered bindings plus the live connection, guarded together
struct Topology {
    bindings: BTreeSet<(String, String)>,
    channel: Option<Arc<dyn BrokerChannel>>,
}

impl Topology {
    fn exchanges(&self) -> BTreeSet<&str> {
        self.bindings
            .iter()
            .map(|(exchange, _)| exchange.as_str())
            .collect()
    }
}

pub struct ConsumptionEngine {
    transport: Arc<dyn BrokerTransport>,
    config: EngineConfig,
    topology: Mutex<Topology>,
    state: watch::Sender<EngineState>,
    stats: AtomicStats,
}

impl fmt::Debug for ConsumptionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumptionEngine")
            .field("transport", &self.transport.name())
            .field("queue", &self.config.queue)
            .field("state", &self.current_state())
            .finish()
    }
}

impl ConsumptionEngine {
    pub fn new(transport: Arc<dyn BrokerTransport>, config: EngineConfig) -> Self {
        let (state, _) = watch::channel(EngineState::Disconnected);
        Self {
            transport,
            config,
            topology: Mutex::new(Topology {
                bindings: BTreeSet::new(),
                channel: None,
            }),
            state,
            stats: AtomicStats::default(),
        }
    }

    /// Watch state transitions
    pub fn state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            delivered: self.stats.delivered.load(Ordering::SeqCst),
            dropped: self.stats.dropped.load(Ordering::SeqCst),
            decode_failures: self.stats.decode_failures.load(Ordering::SeqCst),
            reconnects: self.stats.reconnects.load(Ordering::SeqCst),
        }
    }

    pub fn queue(&self) -> &str {
        &self.config.queue
    }

    fn set_state(&self, next: EngineState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Consumption engine state change");
        }
    }

    /// Register an exchange binding for the consumption queue.
    ///
    /// The binding is kept for the life of the engine and re-applied after
    /// every reconnect. When a connection is live it is applied immediately;
    /// if that fails the connection is discarded and the binding is applied
    /// by the next reconnect.
    pub async fn subscribe(&self, exchange: &str, routing_key: &str) -> MessagingResult<()> {
        let mut topology = self.topology.lock().await;
        let inserted = topology
            .bindings
            .insert((exchange.to_string(), routing_key.to_string()));

        info!(
            exchange = exchange,
            routing_key = routing_key,
            queue = %self.config.queue,
            new_binding = inserted,
            "📡 Exchange registered for consumption"
        );

        let Some(channel) = topology.channel.clone() else {
            return Ok(());
        };
        if !channel.is_connected() {
            return Ok(());
        }

        let applied = async {
            channel.declare_exchange(exchange).await?;
            channel.declare_queue(&self.config.queue).await?;
            channel
                .bind_queue(&self.config.queue, exchange, routing_key)
                .await
        }
        .await;

        if let Err(e) = applied {
            warn!(
                exchange = exchange,
                error = %e,
                "Live binding failed, deferring to reconnect"
            );
            // a closed channel ends the running consume loop, which reconnects
            // and declares the full topology again
            if let Err(close_error) = channel.close().await {
                debug!(error = %close_error, "Closing stale broker connection failed");
            }
            topology.channel = None;
            self.set_state(EngineState::Disconnected);
        }
        Ok(())
    }

    /// Return the live connection, establishing it and its topology first if
    /// needed. Concurrent callers share a single connection attempt.
    pub async fn connect(&self) -> MessagingResult<Arc<dyn BrokerChannel>> {
        let mut topology = self.topology.lock().await;

        if let Some(channel) = &topology.channel {
            if channel.is_connected() {
                return Ok(channel.clone());
            }
            debug!("Cached broker connection is dead, reconnecting");
            topology.channel = None;
        }

        self.set_state(EngineState::Connecting);
        let channel = match self.transport.connect().await {
            Ok(channel) => channel,
            Err(e) => {
                self.set_state(EngineState::Disconnected);
                return Err(e);
            }
        };

        if let Err(e) = self.declare_topology(channel.as_ref(), &topology).await {
            // best effort, the connection is discarded either way
            let _ = channel.close().await;
            self.set_state(EngineState::Disconnected);
            return Err(e);
        }

        topology.channel = Some(channel.clone());
        self.set_state(EngineState::TopologyReady);
        info!(
            queue = %self.config.queue,
            bindings = topology.bindings.len(),
            "✅ Broker topology ready"
        );
        Ok(channel)
    }

    async fn declare_topology(
        &self,
        channel: &dyn BrokerChannel,
        topology: &Topology,
    ) -> MessagingResult<()> {
        for exchange in topology.exchanges() {
            channel.declare_exchange(exchange).await?;
        }
        channel.declare_queue(&self.config.queue).await?;
        for (exchange, routing_key) in &topology.bindings {
            channel
                .bind_queue(&self.config.queue, exchange, routing_key)
                .await?;
        }
        Ok(())
    }

    /// Forget `channel` if it is still the cached connection
    async fn invalidate(&self, channel: &Arc<dyn BrokerChannel>) {
        let mut topology = self.topology.lock().await;
        let is_current = topology
            .channel
            .as_ref()
            .is_some_and(|current| same_channel(current, channel));
        if is_current {
            topology.channel = None;
        }
        self.set_state(EngineState::Disconnected);
    }

    /// Close the live connection, if any
    pub async fn close(&self) -> MessagingResult<()> {
        let channel = self.topology.lock().await.channel.take();
        self.set_state(EngineState::Disconnected);
        match channel {
            Some(channel) => channel.close().await,
            None => Ok(()),
        }
    }

    /// Consuming with a live connection
    pub async fn is_healthy(&self) -> bool {
        if self.current_state() != EngineState::Consuming {
            return false;
        }
        self.topology
            .lock()
            .await
            .channel
            .as_ref()
            .is_some_and(|channel| channel.is_connected())
    }

    /// Decode one raw delivery and hand it to the delivery queue without
    /// waiting.
    pub fn handle_delivery(&self, body: &[u8], tx: &mpsc::Sender<Envelope>) -> DeliveryOutcome {
        let envelope = match Envelope::from_wire(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.stats.decode_failures.fetch_add(1, Ordering::SeqCst);
                error!(
                    queue = %self.config.queue,
                    bytes = body.len(),
                    error = %e,
                    "❌ Failed to decode envelope, dropping delivery"
                );
                return DeliveryOutcome::Malformed;
            }
        };

        let envelope_id = envelope.id().to_string();
        match tx.try_send(envelope) {
            Ok(()) => {
                self.stats.delivered.fetch_add(1, Ordering::SeqCst);
                debug!(envelope_id = %envelope_id, "Envelope queued for dispatch");
                DeliveryOutcome::Delivered
            }
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                self.stats.dropped.fetch_add(1, Ordering::SeqCst);
                warn!(
                    envelope_id = %envelope_id,
                    envelope_type = %dropped.envelope_type(),
                    capacity = tx.max_capacity(),
                    "Delivery queue full, envelope dropped"
                );
                DeliveryOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(envelope_id = %envelope_id, "Delivery queue closed");
                DeliveryOutcome::ReceiverClosed
            }
        }
    }

    /// Consume until `cancel` fires, reconnecting forever on connection loss.
    ///
    /// A connection attempt that has started runs to completion before
    /// cancellation is honored. The connection is closed when the loop ends.
    pub async fn run(self: Arc<Self>, tx: mpsc::Sender<Envelope>, cancel: CancellationToken) {
        info!(
            queue = %self.config.queue,
            transport = self.transport.name(),
            "🚀 Consumption engine started"
        );

        let mut connection_lost = false;
        while !cancel.is_cancelled() {
            let connected = self.connect().await;
            if cancel.is_cancelled() {
                break;
            }

            let channel = match connected {
                Ok(channel) => {
                    if connection_lost {
                        connection_lost = false;
                        self.stats.reconnects.fetch_add(1, Ordering::SeqCst);
                        info!(queue = %self.config.queue, "🔄 Broker connection re-established");
                    }
                    channel
                }
                Err(e) => {
                    error!(
                        error = %e,
                        retry_in_ms = self.config.reconnect_delay.as_millis() as u64,
                        "Broker connection failed"
                    );
                    if self.pause_before_retry(&cancel).await {
                        break;
                    }
                    continue;
                }
            };

            let stream = match channel.consume(&self.config.queue).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(queue = %self.config.queue, error = %e, "Failed to start consumer");
                    self.invalidate(&channel).await;
                    connection_lost = true;
                    if self.pause_before_retry(&cancel).await {
                        break;
                    }
                    continue;
                }
            };

            self.set_state(EngineState::Consuming);
            info!(queue = %self.config.queue, "📥 Consuming");

            match self.consume_until_lost(&channel, stream, &tx, &cancel).await {
                LoopExit::Cancelled => break,
                LoopExit::ConnectionLost => {
                    self.invalidate(&channel).await;
                    connection_lost = true;
                    warn!(queue = %self.config.queue, "🔌 Broker connection lost, reconnecting");
                }
            }
        }

        if let Err(e) = self.close().await {
            warn!(queue = %self.config.queue, error = %e, "Failed to close broker connection");
        }
        info!(queue = %self.config.queue, "🛑 Consumption engine stopped");
    }

    async fn consume_until_lost(
        &self,
        channel: &Arc<dyn BrokerChannel>,
        mut stream: DeliveryStream,
        tx: &mpsc::Sender<Envelope>,
        cancel: &CancellationToken,
    ) -> LoopExit {
        let mut probe = tokio::time::interval(self.config.health_probe_interval);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        probe.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return LoopExit::Cancelled,
                _ = probe.tick() => {
                    if !channel.is_connected() {
                        warn!("Health probe found the broker connection closed");
                        return LoopExit::ConnectionLost;
                    }
                }
                next = stream.next() => match next {
                    Some(Ok(body)) => {
                        if self.handle_delivery(&body, tx) == DeliveryOutcome::ReceiverClosed {
                            return LoopExit::Cancelled;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Delivery stream failed");
                        return LoopExit::ConnectionLost;
                    }
                    None => return LoopExit::ConnectionLost,
                },
            }
        }
    }

    /// Sleep the reconnect delay; true when cancelled meanwhile
    async fn pause_before_retry(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(self.config.reconnect_delay) => false,
        }
    }
}

fn same_channel(a: &Arc<dyn BrokerChannel>, b: &Arc<dyn BrokerChannel>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::providers::InMemoryBroker;

    fn engine(broker: &InMemoryBroker) -> ConsumptionEngine {
        ConsumptionEngine::new(broker.transport(), EngineConfig::new("form_requests"))
    }

    fn wire(envelope_type: &str) -> Vec<u8> {
        Envelope::new(envelope_type, b"{}".to_vec()).to_wire().unwrap()
    }

    #[tokio::test]
    async fn test_starts_disconnected() {
        let broker = InMemoryBroker::new();
        let engine = engine(&broker);

        assert_eq!(engine.current_state(), EngineState::Disconnected);
        assert_eq!(engine.stats(), EngineStats::default());
        assert!(!engine.is_healthy().await);
    }

    #[tokio::test]
    async fn test_connect_declares_registered_topology() {
        let broker = InMemoryBroker::new();
        let engine = engine(&broker);
        engine.subscribe("form.requests", "request").await.unwrap();

        engine.connect().await.unwrap();

        assert_eq!(engine.current_state(), EngineState::TopologyReady);
        assert!(broker.has_exchange("form.requests"));
        assert!(broker.has_binding("form_requests", "form.requests", "request"));
    }

    #[tokio::test]
    async fn test_connect_reuses_live_connection() {
        let broker = InMemoryBroker::new();
        let engine = engine(&broker);

        engine.connect().await.unwrap();
        engine.connect().await.unwrap();

        assert_eq!(broker.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_while_connected_binds_immediately() {
        let broker = InMemoryBroker::new();
        let engine = engine(&broker);
        engine.connect().await.unwrap();

        engine.subscribe("form.admin", "request").await.unwrap();

        assert!(broker.has_binding("form_requests", "form.admin", "request"));
    }

    #[tokio::test]
    async fn test_failed_connect_returns_to_disconnected() {
        let broker = InMemoryBroker::new();
        broker.refuse_connections(1);
        let engine = engine(&broker);

        assert!(engine.connect().await.is_err());
        assert_eq!(engine.current_state(), EngineState::Disconnected);
    }

    #[tokio::test]
    async fn test_handle_delivery_outcomes() {
        let broker = InMemoryBroker::new();
        let engine = engine(&broker);
        let (tx, mut rx) = mpsc::channel(1);

        assert_eq!(engine.handle_delivery(&wire("update"), &tx), DeliveryOutcome::Delivered);
        assert_eq!(engine.handle_delivery(&wire("update"), &tx), DeliveryOutcome::Dropped);
        assert_eq!(engine.handle_delivery(b"{}", &tx), DeliveryOutcome::Malformed);

        assert_eq!(rx.recv().await.unwrap().envelope_type(), "update");
        drop(rx);
        assert_eq!(
            engine.handle_delivery(&wire("update"), &tx),
            DeliveryOutcome::ReceiverClosed
        );

        let stats = engine.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.decode_failures, 1);
    }

    #[tokio::test]
    async fn test_close_is_safe_without_connection() {
        let broker = InMemoryBroker::new();
        let engine = engine(&broker);

        engine.close().await.unwrap();
        engine.connect().await.unwrap();
        engine.close().await.unwrap();

        assert_eq!(engine.current_state(), EngineState::Disconnected);
    }
}
