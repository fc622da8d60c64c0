//! Sink for deliveries that could not be processed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::message::Delivery;

/// A delivery that exhausted its attempts or can never be processed.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub queue: String,
    pub handler: &'static str,
    pub delivery: Delivery,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Destination for dead letters.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn record(&self, letter: DeadLetter);
}

/// Keeps dead letters in memory for inspection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeadLetters {
    letters: Arc<RwLock<Vec<DeadLetter>>>,
}

impl InMemoryDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded dead letters, oldest first.
    pub async fn letters(&self) -> Vec<DeadLetter> {
        self.letters.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.letters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.letters.read().await.is_empty()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetters {
    async fn record(&self, letter: DeadLetter) {
        self.letters.write().await.push(letter);
    }
}
