//! Topic exchange carried over a NATS server.
//!
//! Routing keys travel as subjects under the exchange name, so
//! `order.created` on exchange `default` is published to
//! `default.order.created`. Bodies are the JSON payload as-is.
//!
//! NATS core has no broker-side queues or acknowledgements. Each declared
//! queue is a subscription feeding a local channel; acks and requeues are
//! tracked on that channel, so redelivery covers handler failures but not a
//! crash of the consuming process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_nats::connection::State;
use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::bus::{EventBus, Queue};
use crate::connector::BusConnector;
use crate::message::Delivery;
use crate::pattern::{TopicPattern, validate_routing_key};
use crate::{BusError, Result};

/// Opens [`NatsConnection`]s to one server and exchange.
#[derive(Debug, Clone)]
pub struct NatsConnector {
    url: String,
    exchange: String,
    next_connection: Arc<AtomicU64>,
}

impl NatsConnector {
    pub fn new(url: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exchange: exchange.into(),
            next_connection: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BusConnector for NatsConnector {
    type Connection = NatsConnection;

    fn exchange(&self) -> &str {
        &self.exchange
    }

    #[tracing::instrument(skip(self), fields(url = %self.url, exchange = %self.exchange))]
    async fn connect(&self) -> Result<NatsConnection> {
        validate_exchange(&self.exchange)?;
        let client = async_nats::connect(self.url.as_str())
            .await
            .map_err(|e| BusError::Unavailable(format!("cannot reach {}: {e}", self.url)))?;

        let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(connection = id, "bus connection opened");
        Ok(NatsConnection {
            inner: Arc::new(NatsInner {
                id,
                client,
                exchange: self.exchange.clone(),
                closed: CancellationToken::new(),
                queues: Mutex::new(HashMap::new()),
                next_queue: AtomicU64::new(1),
                next_tag: AtomicU64::new(1),
            }),
        })
    }
}

struct LocalQueue {
    sender: mpsc::UnboundedSender<Delivery>,
    unacked: HashSet<u64>,
}

struct NatsInner {
    id: u64,
    client: async_nats::Client,
    exchange: String,
    closed: CancellationToken,
    queues: Mutex<HashMap<String, LocalQueue>>,
    next_queue: AtomicU64,
    next_tag: AtomicU64,
}

impl NatsInner {
    fn next_tag(&self) -> u64 {
        self.next_tag.fetch_add(1, Ordering::Relaxed)
    }
}

/// A connection to a NATS server. Clones share the connection.
#[derive(Clone)]
pub struct NatsConnection {
    inner: Arc<NatsInner>,
}

impl NatsConnection {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns true while the connection is open and the server reachable.
    pub fn is_open(&self) -> bool {
        self.ensure_open().is_ok()
    }

    /// Number of deliveries handed out on `queue` and not yet acknowledged.
    pub async fn unacked_count(&self, queue: &str) -> usize {
        self.inner
            .queues
            .lock()
            .await
            .get(queue)
            .map_or(0, |q| q.unacked.len())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.is_cancelled() {
            return Err(BusError::ConnectionClosed(self.inner.id));
        }
        if matches!(self.inner.client.connection_state(), State::Disconnected) {
            return Err(BusError::Unavailable(format!(
                "connection {} lost its server",
                self.inner.id
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for NatsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsConnection")
            .field("exchange", &self.inner.exchange)
            .field("id", &self.inner.id)
            .finish()
    }
}

fn unavailable(e: impl std::fmt::Display) -> BusError {
    BusError::Unavailable(e.to_string())
}

#[async_trait]
impl EventBus for NatsConnection {
    async fn publish(&self, routing_key: &str, payload: serde_json::Value) -> Result<()> {
        validate_routing_key(routing_key)?;
        self.ensure_open()?;

        let body = serde_json::to_vec(&payload)?;
        let subject = subject(&self.inner.exchange, routing_key);
        self.inner
            .client
            .publish(subject, body.into())
            .await
            .map_err(unavailable)?;
        self.inner.client.flush().await.map_err(unavailable)?;

        metrics::counter!("bus_messages_published").increment(1);
        tracing::debug!(routing_key, "message published");
        Ok(())
    }

    async fn declare_queue(&self, pattern: &str) -> Result<Queue> {
        let pattern = TopicPattern::parse(pattern)?;
        self.ensure_open()?;

        let filter = subject(&self.inner.exchange, &pattern.nats_filter()?);
        let subscription = self
            .inner
            .client
            .subscribe(filter.clone())
            .await
            .map_err(unavailable)?;
        // The server must know the subscription before anyone publishes.
        self.inner.client.flush().await.map_err(unavailable)?;

        let n = self.inner.next_queue.fetch_add(1, Ordering::Relaxed);
        let name = format!("nats.gen-{}-{n}", self.inner.id);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner.queues.lock().await.insert(
            name.clone(),
            LocalQueue {
                sender,
                unacked: HashSet::new(),
            },
        );
        tokio::spawn(forward(
            self.inner.clone(),
            name.clone(),
            pattern.clone(),
            subscription,
        ));

        tracing::debug!(queue = %name, pattern = %pattern, %filter, "queue declared");
        Ok(Queue::new(name, pattern, receiver))
    }

    async fn ack(&self, queue: &str, delivery_tag: u64) -> Result<()> {
        self.ensure_open()?;
        if let Some(q) = self.inner.queues.lock().await.get_mut(queue) {
            q.unacked.remove(&delivery_tag);
        }
        Ok(())
    }

    async fn requeue(&self, queue: &str, delivery: Delivery) -> Result<()> {
        self.ensure_open()?;

        let delivery_tag = self.inner.next_tag();
        let mut queues = self.inner.queues.lock().await;
        let q = queues
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
        self.inner.closed.cancel();
        let queues_deleted = {
            let mut queues = self.inner.queues.lock().await;
            let n = queues.len();
            queues.clear();
            n
        };
        if let Err(e) = self.inner.client.flush().await {
            tracing::debug!(error = %e, "flush on close failed");
        }
        tracing::debug!(connection = self.inner.id, queues_deleted, "bus connection closed");
    }
}

/// Moves messages from one subscription into its local queue until the
/// connection closes or the consumer drops the queue.
async fn forward(
    inner: Arc<NatsInner>,
    name: String,
    pattern: TopicPattern,
    mut subscription: async_nats::Subscriber,
) {
    loop {
        let message = tokio::select! {
            () = inner.closed.cancelled() => break,
            next = subscription.next() => match next {
                Some(message) => message,
                None => break,
            },
        };

        let subject = message.subject.to_string();
        let Some(routing_key) = routing_key(&inner.exchange, &subject) else {
            continue;
        };
        // The filter over-approximates `#` tails; the pattern has the last word.
        if !pattern.matches(routing_key) {
            continue;
        }

        let delivery_tag = inner.next_tag();
        let delivery = Delivery {
            delivery_tag,
            routing_key: routing_key.to_string(),
            payload: decode_body(&message.payload),
            emitted_at: Utc::now(),
            redelivered: false,
            attempt: 1,
        };

        let mut queues = inner.queues.lock().await;
        let sent = match queues.get_mut(&name) {
            Some(queue) if queue.sender.send(delivery).is_ok() => {
                queue.unacked.insert(delivery_tag);
                true
            }
            _ => false,
        };
        if !sent {
            queues.remove(&name);
            break;
        }
    }
    tracing::debug!(queue = %name, "subscription ended");
}

fn validate_exchange(exchange: &str) -> Result<()> {
    if exchange.is_empty()
        || exchange.contains(['.', '*', '>', '#'])
        || exchange.contains(char::is_whitespace)
    {
        return Err(BusError::InvalidPattern {
            pattern: exchange.to_string(),
            reason: "exchange must be a single word".to_string(),
        });
    }
    Ok(())
}

fn subject(exchange: &str, key: &str) -> String {
    format!("{exchange}.{key}")
}

fn routing_key<'a>(exchange: &str, subject: &'a str) -> Option<&'a str> {
    subject.strip_prefix(exchange)?.strip_prefix('.')
}

/// Bodies that are not JSON are handed on as a string so the handler can
/// reject them as malformed.
fn decode_body(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "non-JSON message body");
        serde_json::Value::String(String::from_utf8_lossy(body).into_owned())
    })
}
