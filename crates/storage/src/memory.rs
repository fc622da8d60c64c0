use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Result;
use crate::store::DocumentStore;

/// In-memory document store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore<D> {
    document: Arc<RwLock<D>>,
}

impl<D> InMemoryDocumentStore<D>
where
    D: Clone + Default,
{
    /// Creates a store holding `D::default()`.
    pub fn new() -> Self {
        Self {
            document: Arc::new(RwLock::new(D::default())),
        }
    }

    /// Creates a store seeded with `document`.
    pub fn with_document(document: D) -> Self {
        Self {
            document: Arc::new(RwLock::new(document)),
        }
    }

    /// Returns a copy of the current document.
    pub async fn snapshot(&self) -> D {
        self.document.read().await.clone()
    }
}

#[async_trait]
impl<D> DocumentStore<D> for InMemoryDocumentStore<D>
where
    D: Clone + Send + Sync + 'static,
{
    async fn load(&self) -> Result<D> {
        Ok(self.document.read().await.clone())
    }

    async fn save(&self, document: &D) -> Result<()> {
        *self.document.write().await = document.clone();
        Ok(())
    }
}
