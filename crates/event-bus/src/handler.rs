//! Message handler trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::message::Delivery;

/// Reacts to deliveries on one bound queue.
///
/// A handler must be safe to run twice on the same message: deliveries are
/// at-least-once and a failed attempt is redelivered.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Name used in logs and dead letters.
    fn name(&self) -> &'static str;

    /// Processes one delivery. Returning `Ok` acknowledges it.
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError>;
}

#[async_trait]
impl<H: MessageHandler + ?Sized> MessageHandler for Arc<H> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        (**self).handle(delivery).await
    }
}
