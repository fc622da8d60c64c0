//! Notification relay: fans every bus event out to push-stream listeners.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// One frame of the notification stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Routing key of the event.
    pub event: String,
    pub data: Value,
}

const DEFAULT_CAPACITY: usize = 256;

/// Broadcasts notifications to every current listener.
///
/// Listeners that fall more than the channel capacity behind lose the
/// oldest frames.
#[derive(Debug, Clone)]
pub struct NotificationRelay {
    sender: broadcast::Sender<Notification>,
}

impl Default for NotificationRelay {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationRelay {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn listen(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Relays a frame and returns how many listeners received it.
    pub fn relay(&self, notification: Notification) -> usize {
        metrics::counter!("notifications_relayed").increment(1);
        // No listeners is not an error.
        self.sender.send(notification).unwrap_or(0)
    }
}
