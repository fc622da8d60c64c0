//! In-process topic exchange.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, mpsc};

use crate::bus::{EventBus, Queue};
use crate::connector::BusConnector;
use crate::message::Delivery;
use crate::pattern::{TopicPattern, validate_routing_key};
use crate::{BusError, Result};

struct BoundQueue {
    owner: u64,
    pattern: TopicPattern,
    sender: mpsc::UnboundedSender<Delivery>,
    unacked: HashSet<u64>,
}

struct BrokerState {
    running: bool,
    connections: HashSet<u64>,
    queues: HashMap<String, BoundQueue>,
}

struct BrokerInner {
    exchange: String,
    state: RwLock<BrokerState>,
    next_connection: AtomicU64,
    next_queue: AtomicU64,
    next_tag: AtomicU64,
}

/// A single topic exchange shared by every service in the process.
///
/// The broker owns the queues and their bindings. Services never touch it
/// directly: they [`connect`](Broker::connect) and use the returned
/// [`BusConnection`], which is opened at service start and closed at shutdown.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl Broker {
    /// Creates a running broker with one topic exchange.
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                exchange: exchange.into(),
                state: RwLock::new(BrokerState {
                    running: true,
                    connections: HashSet::new(),
                    queues: HashMap::new(),
                }),
                next_connection: AtomicU64::new(1),
                next_queue: AtomicU64::new(1),
                next_tag: AtomicU64::new(1),
            }),
        }
    }

    /// Name of the exchange.
    pub fn exchange(&self) -> &str {
        &self.inner.exchange
    }

    /// Opens a new connection.
    #[tracing::instrument(skip(self), fields(exchange = %self.inner.exchange))]
    pub async fn connect(&self) -> Result<BusConnection> {
        let mut state = self.inner.state.write().await;
        if !state.running {
            return Err(BusError::Unavailable(format!(
                "broker for exchange '{}' is shut down",
                self.inner.exchange
            )));
        }
        let id = self.inner.next_connection.fetch_add(1, Ordering::Relaxed);
        state.connections.insert(id);
        tracing::debug!(connection = id, "bus connection opened");
        Ok(BusConnection {
            broker: self.clone(),
            id,
        })
    }

    /// Stops the broker. Every connection is closed and every queue deleted.
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.write().await;
        state.running = false;
        state.connections.clear();
        state.queues.clear();
        tracing::info!(exchange = %self.inner.exchange, "broker shut down");
    }

    /// Returns true until [`shutdown`](Broker::shutdown) is called.
    pub async fn is_running(&self) -> bool {
        self.inner.state.read().await.running
    }

    /// Number of live queues.
    pub async fn queue_count(&self) -> usize {
        self.inner.state.read().await.queues.len()
    }

    /// Number of deliveries handed out on `queue` and not yet acknowledged.
    pub async fn unacked_count(&self, queue: &str) -> usize {
        self.inner
            .state
            .read()
            .await
            .queues
            .get(queue)
            .map_or(0, |q| q.unacked.len())
    }

    fn next_tag(&self) -> u64 {
        self.inner.next_tag.fetch_add(1, Ordering::Relaxed)
    }
}

/// A connection to the [`Broker`].
///
/// Clones share the connection. Queues declared through it are exclusive to
/// it and deleted when it closes.
#[derive(Clone)]
pub struct BusConnection {
    broker: Broker,
    id: u64,
}

impl BusConnection {
    /// Connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The broker this connection belongs to.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Returns true while the connection and the broker are up.
    pub async fn is_open(&self) -> bool {
        let state = self.broker.inner.state.read().await;
        state.running && state.connections.contains(&self.id)
    }

    fn ensure_open(&self, state: &BrokerState) -> Result<()> {
        if !state.running {
            return Err(BusError::Unavailable(format!(
                "broker for exchange '{}' is shut down",
                self.broker.inner.exchange
            )));
        }
        if !state.connections.contains(&self.id) {
            return Err(BusError::ConnectionClosed(self.id));
        }
        Ok(())
    }
}

impl std::fmt::Debug for BusConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusConnection")
            .field("exchange", &self.broker.inner.exchange)
            .field("id", &self.id)
            .finish()
    }
}

#[async_trait]
impl EventBus for BusConnection {
    async fn publish(&self, routing_key: &str, payload: serde_json::Value) -> Result<()> {
        validate_routing_key(routing_key)?;

        let mut state = self.broker.inner.state.write().await;
        self.ensure_open(&state)?;

        let emitted_at = Utc::now();
        let mut routed = 0usize;
        let mut gone = Vec::new();

        for (name, queue) in state.queues.iter_mut() {
            if !queue.pattern.matches(routing_key) {
                continue;
            }
            let delivery_tag = self.broker.next_tag();
            let delivery = Delivery {
                delivery_tag,
                routing_key: routing_key.to_string(),
                payload: payload.clone(),
                emitted_at,
                redelivered: false,
                attempt: 1,
            };
            if queue.sender.send(delivery).is_ok() {
                queue.unacked.insert(delivery_tag);
                routed += 1;
            } else {
                gone.push(name.clone());
            }
        }

        // Consumers that dropped their queue without closing the connection.
        for name in gone {
            state.queues.remove(&name);
        }

        metrics::counter!("bus_messages_published").increment(1);
        tracing::debug!(routing_key, routed, "message published");
        Ok(())
    }

    async fn declare_queue(&self, pattern: &str) -> Result<Queue> {
        let pattern = TopicPattern::parse(pattern)?;

        let mut state = self.broker.inner.state.write().await;
        self.ensure_open(&state)?;

        let n = self.broker.inner.next_queue.fetch_add(1, Ordering::Relaxed);
        let name = format!("amq.gen-{n}");
        let (sender, receiver) = mpsc::unbounded_channel();
        state.queues.insert(
            name.clone(),
            BoundQueue {
                owner: self.id,
                pattern: pattern.clone(),
                sender,
                unacked: HashSet::new(),
            },
        );

        tracing::debug!(queue = %name, pattern = %pattern, "queue declared");
        Ok(Queue::new(name, pattern, receiver))
    }

    async fn ack(&self, queue: &str, delivery_tag: u64) -> Result<()> {
        let mut state = self.broker.inner.state.write().await;
        self.ensure_open(&state)?;
        if let Some(q) = state.queues.get_mut(queue) {
            q.unacked.remove(&delivery_tag);
        }
        Ok(())
    }

    async fn requeue(&self, queue: &str, delivery: Delivery) -> Result<()> {
        let mut state = self.broker.inner.state.write().await;
        self.ensure_open(&state)?;

        let delivery_tag = self.broker.next_tag();
        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BusError::Unavailable(format!("queue '{queue}' no longer exists")))?;

        q.unacked.remove(&delivery.delivery_tag);
        q.sender
            .send(delivery.redelivery(delivery_tag))
            .map_err(|_| BusError::Unavailable(format!("queue '{queue}' has no consumer")))?;
        q.unacked.insert(delivery_tag);
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.broker.inner.state.write().await;
        state.connections.remove(&self.id);
        let before = state.queues.len();
        state.queues.retain(|_, q| q.owner != self.id);
        tracing::debug!(
            connection = self.id,
            queues_deleted = before - state.queues.len(),
            "bus connection closed"
        );
    }
}

#[async_trait]
impl BusConnector for Broker {
    type Connection = BusConnection;

    fn exchange(&self) -> &str {
        Broker::exchange(self)
    }

    async fn connect(&self) -> Result<BusConnection> {
        Broker::connect(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_routes_to_matching_queues_only() {
        let broker = Broker::new("default");
        let conn = broker.connect().await.unwrap();

        let mut created = conn.declare_queue("order.created").await.unwrap();
        let mut orders = conn.declare_queue("order.*").await.unwrap();
        let mut payments = conn.declare_queue("payment.#").await.unwrap();

        conn.publish("order.created", serde_json::json!({ "id": 1 }))
            .await
            .unwrap();

        assert_eq!(created.next().await.unwrap().payload["id"], 1);
        assert_eq!(orders.next().await.unwrap().routing_key, "order.created");
        assert!(payments.try_next().is_none());
    }

    #[tokio::test]
    async fn unroutable_publish_is_accepted() {
        let broker = Broker::new("default");
        let conn = broker.connect().await.unwrap();
        conn.publish("order.created", serde_json::json!({}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn same_key_order_is_preserved() {
        let broker = Broker::new("default");
        let conn = broker.connect().await.unwrap();
        let mut queue = conn.declare_queue("order.created").await.unwrap();

        for i in 0..10 {
            conn.publish("order.created", serde_json::json!({ "seq": i }))
                .await
                .unwrap();
        }
        for i in 0..10 {
            assert_eq!(queue.next().await.unwrap().payload["seq"], i);
        }
    }

    #[tokio::test]
    async fn publish_on_closed_connection_fails() {
        let broker = Broker::new("default");
        let conn = broker.connect().await.unwrap();
        conn.close().await;

        let err = conn
            .publish("order.created", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::ConnectionClosed(_)));
        assert!(!conn.is_open().await);
    }

    #[tokio::test]
    async fn shutdown_makes_bus_unavailable() {
        let broker = Broker::new("default");
        let conn = broker.connect().await.unwrap();
        broker.shutdown().await;

        assert!(matches!(
            conn.publish("order.created", serde_json::json!({})).await,
            Err(BusError::Unavailable(_))
        ));
        assert!(matches!(broker.connect().await, Err(BusError::Unavailable(_))));
    }

    #[tokio::test]
    async fn closing_a_connection_deletes_its_queues() {
        let broker = Broker::new("default");
        let publisher = broker.connect().await.unwrap();
        let consumer = broker.connect().await.unwrap();

        let mut queue = consumer.declare_queue("#").await.unwrap();
        let _other = publisher.declare_queue("#").await.unwrap();
        assert_eq!(broker.queue_count().await, 2);

        consumer.close().await;
        assert_eq!(broker.queue_count().await, 1);
        assert!(queue.next().await.is_none());
    }

    #[tokio::test]
    async fn ack_and_requeue_track_unacked_deliveries() {
        let broker = Broker::new("default");
        let conn = broker.connect().await.unwrap();
        let mut queue = conn.declare_queue("order.created").await.unwrap();

        conn.publish("order.created", serde_json::json!({ "id": 1 }))
            .await
            .unwrap();
        assert_eq!(broker.unacked_count(queue.name()).await, 1);

        let first = queue.next().await.unwrap();
        conn.requeue(queue.name(), first.clone()).await.unwrap();

        let second = queue.next().await.unwrap();
        assert!(second.redelivered);
        assert_eq!(second.attempt, 2);
        assert_ne!(second.delivery_tag, first.delivery_tag);
        assert_eq!(broker.unacked_count(queue.name()).await, 1);

        conn.ack(queue.name(), second.delivery_tag).await.unwrap();
        assert_eq!(broker.unacked_count(queue.name()).await, 0);
    }

    #[tokio::test]
    async fn requeued_delivery_goes_behind_newer_messages() {
        let broker = Broker::new("default");
        let conn = broker.connect().await.unwrap();
        let mut queue = conn.declare_queue("order.created").await.unwrap();

        conn.publish("order.created", serde_json::json!({ "seq": 1 }))
            .await
            .unwrap();
        let first = queue.next().await.unwrap();
        conn.publish("order.created", serde_json::json!({ "seq": 2 }))
            .await
            .unwrap();
        conn.requeue(queue.name(), first).await.unwrap();

        assert_eq!(queue.next().await.unwrap().payload["seq"], 2);
        let redelivered = queue.next().await.unwrap();
        assert_eq!(redelivered.payload["seq"], 1);
        assert!(redelivered.redelivered);
    }

    #[tokio::test]
    async fn dropped_queue_is_removed_on_next_publish() {
        let broker = Broker::new("default");
        let conn = broker.connect().await.unwrap();
        let queue = conn.declare_queue("#").await.unwrap();
        drop(queue);

        conn.publish("order.created", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(broker.queue_count().await, 0);
    }

    #[tokio::test]
    async fn wildcard_routing_key_is_rejected() {
        let broker = Broker::new("default");
        let conn = broker.connect().await.unwrap();
        assert!(matches!(
            conn.publish("order.*", serde_json::json!({})).await,
            Err(BusError::InvalidPattern { .. })
        ));
    }
}
