//! Subscriber loops: one sequential consumer per bound queue.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::{EventBus, Queue};
use crate::dead_letter::{DeadLetter, DeadLetterSink};
use crate::error::HandlerError;
use crate::handler::MessageHandler;
use crate::message::Delivery;
use crate::Result;

/// How often a failing delivery is attempted before it is dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first delivery.
    pub max_attempts: u32,
    /// Delay before a failed delivery is put back on its queue.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// A policy that dead-letters on the first failure.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Returns true if a delivery that failed on `attempt` gets another one.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

/// Runs message handlers against queues on an [`EventBus`].
///
/// Each subscription gets its own queue and its own loop. Within a loop the
/// handler runs one delivery at a time; loops for different queues run
/// concurrently. A delivery is acknowledged only after its handler returns
/// `Ok`. Handler failures and panics never end the loop: retryable failures
/// are requeued after [`RetryPolicy::backoff`], everything else ends up in
/// the dead-letter sink.
#[derive(Clone)]
pub struct Subscriber<B> {
    bus: B,
    policy: RetryPolicy,
    dead_letters: Arc<dyn DeadLetterSink>,
}

impl<B> Subscriber<B>
where
    B: EventBus + Clone + 'static,
{
    pub fn new(bus: B, policy: RetryPolicy, dead_letters: Arc<dyn DeadLetterSink>) -> Self {
        Self {
            bus,
            policy,
            dead_letters,
        }
    }

    /// The bus this subscriber consumes from.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Binds a queue to `pattern` and consumes it on the calling task until
    /// `cancel` fires or the queue is deleted.
    pub async fn subscribe<H>(
        &self,
        pattern: &str,
        handler: H,
        cancel: CancellationToken,
    ) -> Result<()>
    where
        H: MessageHandler + 'static,
    {
        let queue = self.bus.declare_queue(pattern).await?;
        self.consume(queue, Arc::new(handler), cancel).await;
        Ok(())
    }

    /// Binds a queue to `pattern` immediately and consumes it on a new task.
    ///
    /// Messages published after this returns are routed to the new queue.
    pub async fn spawn<H>(
        &self,
        pattern: &str,
        handler: H,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>>
    where
        H: MessageHandler + 'static,
    {
        let queue = self.bus.declare_queue(pattern).await?;
        let subscriber = self.clone();
        let handler = Arc::new(handler);
        Ok(tokio::spawn(async move {
            subscriber.consume(queue, handler, cancel).await;
        }))
    }

    async fn consume<H>(&self, mut queue: Queue, handler: Arc<H>, cancel: CancellationToken)
    where
        H: MessageHandler + 'static,
    {
        let queue_name = queue.name().to_string();
        tracing::info!(
            queue = %queue_name,
            pattern = %queue.pattern(),
            handler = handler.name(),
            "subscriber started"
        );

        loop {
            let delivery = tokio::select! {
                () = cancel.cancelled() => break,
                next = queue.next() => match next {
                    Some(delivery) => delivery,
                    None => break,
                },
            };
            self.dispatch(&queue_name, handler.as_ref(), delivery).await;
        }

        tracing::info!(queue = %queue_name, handler = handler.name(), "subscriber stopped");
    }

    #[tracing::instrument(
        skip_all,
        fields(
            queue = %queue,
            handler = handler.name(),
            routing_key = %delivery.routing_key,
            attempt = delivery.attempt
        )
    )]
    async fn dispatch<H>(&self, queue: &str, handler: &H, delivery: Delivery)
    where
        H: MessageHandler,
    {
        metrics::counter!("bus_messages_delivered").increment(1);

        let outcome = AssertUnwindSafe(handler.handle(&delivery))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(HandlerError::Failed("handler panicked".to_string())));

        match outcome {
            Ok(()) => {
                if let Err(e) = self.bus.ack(queue, delivery.delivery_tag).await {
                    tracing::warn!(error = %e, "ack failed");
                }
            }
            Err(err) if err.is_retryable() && self.policy.should_retry(delivery.attempt) => {
                metrics::counter!("bus_handler_retries").increment(1);
                tracing::warn!(error = %err, "handler failed, scheduling redelivery");
                self.schedule_requeue(queue, delivery);
            }
            Err(err) => self.dead_letter(queue, handler.name(), delivery, err).await,
        }
    }

    fn schedule_requeue(&self, queue: &str, delivery: Delivery) {
        let bus = self.bus.clone();
        let queue = queue.to_string();
        let backoff = self.policy.backoff;
        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            let routing_key = delivery.routing_key.clone();
            if let Err(e) = bus.requeue(&queue, delivery).await {
                tracing::warn!(error = %e, %queue, %routing_key, "redelivery dropped");
            }
        });
    }

    async fn dead_letter(
        &self,
        queue: &str,
        handler: &'static str,
        delivery: Delivery,
        err: HandlerError,
    ) {
        if let Err(e) = self.bus.ack(queue, delivery.delivery_tag).await {
            tracing::warn!(error = %e, "ack of dead letter failed");
        }

        metrics::counter!("bus_dead_letters").increment(1);
        tracing::error!(error = %err, "delivery dead-lettered");

        self.dead_letters
            .record(DeadLetter {
                queue: queue.to_string(),
                handler,
                delivery,
                reason: err.to_string(),
                dead_lettered_at: Utc::now(),
            })
            .await;
    }
}
