//! Core bus trait.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::message::Delivery;
use crate::pattern::TopicPattern;
use crate::Result;

/// A private queue bound to a pattern on the exchange.
///
/// The queue is exclusive to the connection that declared it and disappears
/// when that connection closes, at which point [`Queue::next`] returns `None`.
pub struct Queue {
    name: String,
    pattern: TopicPattern,
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

impl Queue {
    pub(crate) fn new(
        name: String,
        pattern: TopicPattern,
        receiver: mpsc::UnboundedReceiver<Delivery>,
    ) -> Self {
        Self {
            name,
            pattern,
            receiver,
        }
    }

    /// Broker-generated queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pattern this queue is bound with.
    pub fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    /// Waits for the next delivery. Returns `None` once the queue is deleted.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }

    /// Returns a delivery if one is already waiting.
    pub fn try_next(&mut self) -> Option<Delivery> {
        self.receiver.try_recv().ok()
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

/// Trait for a connection to a topic exchange.
///
/// Delivery is at-least-once: a message is handed out again when it is
/// requeued instead of acknowledged. Messages published on one connection with
/// the same routing key reach a queue in publish order; no order holds across
/// different routing keys. A requeued message goes to the back of its queue,
/// so while a redelivery is pending it can arrive after newer messages with
/// the same routing key.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a message. Returns once the broker accepted it, not once any
    /// subscriber received it.
    ///
    /// Fails with [`BusError::Unavailable`](crate::BusError::Unavailable) if
    /// the connection is gone or the broker rejects the publish.
    async fn publish(&self, routing_key: &str, payload: serde_json::Value) -> Result<()>;

    /// Declares an exclusive, non-durable queue bound to `pattern`.
    async fn declare_queue(&self, pattern: &str) -> Result<Queue>;

    /// Acknowledges a delivery; the broker forgets it.
    async fn ack(&self, queue: &str, delivery_tag: u64) -> Result<()>;

    /// Returns an unacknowledged delivery to the back of its queue.
    async fn requeue(&self, queue: &str, delivery: Delivery) -> Result<()>;

    /// Closes the connection and deletes the queues it declared.
    ///
    /// Subscriber loops on those queues see the queue end and return.
    async fn close(&self);
}

/// Serializes `body` to JSON and publishes it.
pub async fn publish_json<B, T>(bus: &B, routing_key: &str, body: &T) -> Result<()>
where
    B: EventBus + ?Sized,
    T: Serialize + Sync,
{
    let payload = serde_json::to_value(body)?;
    bus.publish(routing_key, payload).await
}
