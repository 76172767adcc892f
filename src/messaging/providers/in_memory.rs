//! # In-Memory Broker
//!
//! Process-local broker implementing [`BrokerTransport`] with direct-exchange
//! routing, for tests and local development. It records every operation in
//! an ordered log and can simulate refused connections, dropped connections
//! and broker restarts that forget all topology.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::messaging::errors::{MessagingError, MessagingResult};
use crate::messaging::transport::{BrokerChannel, BrokerTransport, DeliveryStream};

/// One entry of the broker operation log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerOp {
    Connect { generation: u64 },
    ConnectRefused,
    DeclareExchange { exchange: String },
    DeclareQueue { queue: String },
    Bind { queue: String, exchange: String, routing_key: String },
    Consume { queue: String },
    Publish { exchange: String, routing_key: String },
    Close { generation: u64 },
}

/// A message accepted by an exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
}

type ConsumerSender = mpsc::UnboundedSender<MessagingResult<Vec<u8>>>;

#[derive(Debug, Default)]
struct BrokerState {
    /// Connections from older generations are dead
    generation: u64,
    refuse_remaining: u32,
    /// Remaining bind failures per exchange
    failing_binds: HashMap<String, u32>,
    exchanges: BTreeSet<String>,
    queues: HashMap<String, VecDeque<Vec<u8>>>,
    bindings: BTreeSet<(String, String, String)>,
    consumers: HashMap<String, ConsumerSender>,
    ops: Vec<BrokerOp>,
    published: Vec<PublishedMessage>,
}

impl BrokerState {
    fn route(&mut self, exchange: &str, routing_key: &str, body: &[u8]) -> MessagingResult<()> {
        if !self.exchanges.contains(exchange) {
            return Err(MessagingError::publish(
                exchange,
                routing_key,
                "NOT_FOUND - no exchange",
            ));
        }

        self.published.push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: body.to_vec(),
        });

        let targets: Vec<String> = self
            .bindings
            .iter()
            .filter(|(_, ex, key)| ex == exchange && key == routing_key)
            .map(|(queue, _, _)| queue.clone())
            .collect();

        for queue in targets {
            let delivered = match self.consumers.get(&queue) {
                Some(sender) => sender.send(Ok(body.to_vec())).is_ok(),
                None => false,
            };
            if !delivered {
                self.consumers.remove(&queue);
                if let Some(backlog) = self.queues.get_mut(&queue) {
                    backlog.push_back(body.to_vec());
                }
            }
        }
        Ok(())
    }

    fn kill_connections(&mut self) {
        self.generation += 1;
        // dropping the senders ends every open delivery stream
        self.consumers.clear();
    }
}

/// Shared handle to an in-memory broker; clones see the same broker
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport dialing this broker
    pub fn transport(&self) -> Arc<dyn BrokerTransport> {
        Arc::new(self.clone())
    }

    /// Refuse the next `count` connection attempts
    pub fn refuse_connections(&self, count: u32) {
        self.state.lock().refuse_remaining = count;
    }

    /// Fail the next `count` bindings of any queue to `exchange`
    pub fn fail_binds(&self, exchange: &str, count: u32) {
        self.state
            .lock()
            .failing_binds
            .insert(exchange.to_string(), count);
    }

    /// Sever every open connection; topology survives
    pub fn drop_connections(&self) {
        self.state.lock().kill_connections();
    }

    /// Sever every connection and forget all exchanges, queues and bindings
    pub fn restart(&self) {
        let mut state = self.state.lock();
        state.kill_connections();
        state.exchanges.clear();
        state.queues.clear();
        state.bindings.clear();
    }

    /// Publish as an external producer would
    pub fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> MessagingResult<()> {
        self.state.lock().route(exchange, routing_key, body)
    }

    pub fn ops(&self) -> Vec<BrokerOp> {
        self.state.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.lock().ops.clear();
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().published.clone()
    }

    pub fn has_exchange(&self, exchange: &str) -> bool {
        self.state.lock().exchanges.contains(exchange)
    }

    pub fn has_binding(&self, queue: &str, exchange: &str, routing_key: &str) -> bool {
        self.state.lock().bindings.contains(&(
            queue.to_string(),
            exchange.to_string(),
            routing_key.to_string(),
        ))
    }

    /// Number of successful connections made so far
    pub fn connection_count(&self) -> usize {
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| matches!(op, BrokerOp::Connect { .. }))
            .count()
    }

    /// Whether some consumer is currently attached to `queue`
    pub fn has_consumer(&self, queue: &str) -> bool {
        self.state
            .lock()
            .consumers
            .get(queue)
            .is_some_and(|sender| !sender.is_closed())
    }
}

#[async_trait]
impl BrokerTransport for InMemoryBroker {
    async fn connect(&self) -> MessagingResult<Arc<dyn BrokerChannel>> {
        let mut state = self.state.lock();
        if state.refuse_remaining > 0 {
            state.refuse_remaining -= 1;
            state.ops.push(BrokerOp::ConnectRefused);
            return Err(MessagingError::connection("connection refused"));
        }

        let generation = state.generation;
        state.ops.push(BrokerOp::Connect { generation });

        Ok(Arc::new(InMemoryChannel {
            broker: self.clone(),
            generation,
            closed: AtomicBool::new(false),
        }))
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

/// A connection to an [`InMemoryBroker`]
#[derive(Debug)]
pub struct InMemoryChannel {
    broker: InMemoryBroker,
    generation: u64,
    closed: AtomicBool,
}

impl InMemoryChannel {
    /// Lock the broker state if this connection is still alive
    fn live_state(&self) -> MessagingResult<parking_lot::MutexGuard<'_, BrokerState>> {
        let state = self.broker.state.lock();
        if self.closed.load(Ordering::Acquire) || state.generation != self.generation {
            return Err(MessagingError::ChannelClosed);
        }
        Ok(state)
    }
}

#[async_trait]
impl BrokerChannel for InMemoryChannel {
    fn is_connected(&self) -> bool {
        self.live_state().is_ok()
    }

    async fn declare_exchange(&self, exchange: &str) -> MessagingResult<()> {
        let mut state = self.live_state()?;
        state.exchanges.insert(exchange.to_string());
        state.ops.push(BrokerOp::DeclareExchange {
            exchange: exchange.to_string(),
        });
        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> MessagingResult<()> {
        let mut state = self.live_state()?;
        state.queues.entry(queue.to_string()).or_default();
        state.ops.push(BrokerOp::DeclareQueue {
            queue: queue.to_string(),
        });
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> MessagingResult<()> {
        let mut state = self.live_state()?;
        if let Some(remaining) = state.failing_binds.get_mut(exchange).filter(|n| **n > 0) {
            *remaining -= 1;
            return Err(MessagingError::topology(
                format!("binding {queue} <- {exchange}/{routing_key}"),
                "ACCESS_REFUSED - binding rejected",
            ));
        }
        if !state.exchanges.contains(exchange) {
            return Err(MessagingError::topology(
                format!("binding {queue} <- {exchange}/{routing_key}"),
                "NOT_FOUND - no exchange",
            ));
        }
        if !state.queues.contains_key(queue) {
            return Err(MessagingError::topology(
                format!("binding {queue} <- {exchange}/{routing_key}"),
                "NOT_FOUND - no queue",
            ));
        }

        state.bindings.insert((
            queue.to_string(),
            exchange.to_string(),
            routing_key.to_string(),
        ));
        state.ops.push(BrokerOp::Bind {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        });
        Ok(())
    }

    async fn consume(&self, queue: &str) -> MessagingResult<DeliveryStream> {
        let mut state = self.live_state()?;
        let backlog = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| MessagingError::consume(queue, "NOT_FOUND - no queue"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        for body in backlog.drain(..) {
            // receiver is alive, send cannot fail here
            let _ = tx.send(Ok(body));
        }
        state.consumers.insert(queue.to_string(), tx);
        state.ops.push(BrokerOp::Consume {
            queue: queue.to_string(),
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> MessagingResult<()> {
        let mut state = self.live_state()?;
        state.ops.push(BrokerOp::Publish {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        });
        state.route(exchange, routing_key, body)
    }

    async fn close(&self) -> MessagingResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.broker.state.lock().ops.push(BrokerOp::Close {
                generation: self.generation,
            });
        }
        Ok(())
    }
}
