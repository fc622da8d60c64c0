use std::sync::Arc;

use tokio::sync::Mutex;

use crate::store::DocumentStore;
use crate::{Result, StoreError};

/// Outcome of a mutation closure passed to [`GuardedStore::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<R> {
    /// The document was changed and must be written back.
    Modified(R),
    /// Nothing changed; skip the write.
    Unchanged(R),
}

impl<R> Change<R> {
    pub fn into_inner(self) -> R {
        match self {
            Change::Modified(r) | Change::Unchanged(r) => r,
        }
    }

    pub fn is_modified(&self) -> bool {
        matches!(self, Change::Modified(_))
    }
}

/// Serializes read-modify-write cycles on a [`DocumentStore`].
///
/// Clones share the same guard, so every handle a service hands to its HTTP
/// handlers and subscriber loops excludes the others for the whole cycle.
pub struct GuardedStore<D> {
    store: Arc<dyn DocumentStore<D>>,
    guard: Arc<Mutex<()>>,
}

impl<D> Clone for GuardedStore<D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            guard: self.guard.clone(),
        }
    }
}

impl<D> GuardedStore<D>
where
    D: Send + Sync + 'static,
{
    pub fn new(store: impl DocumentStore<D> + 'static) -> Self {
        Self {
            store: Arc::new(store),
            guard: Arc::new(Mutex::new(())),
        }
    }

    /// Loads the current document.
    pub async fn read(&self) -> Result<D> {
        let _guard = self.guard.lock().await;
        self.store.load().await
    }

    /// Loads the document, applies `mutate`, and writes it back if it
    /// reports [`Change::Modified`]. No other cycle on this store runs
    /// in between.
    pub async fn update<R, E, F>(&self, mutate: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut D) -> std::result::Result<Change<R>, E>,
        E: From<StoreError>,
    {
        let _guard = self.guard.lock().await;
        let mut document = self.store.load().await?;
        match mutate(&mut document)? {
            Change::Modified(result) => {
                self.store.save(&document).await?;
                Ok(result)
            }
            Change::Unchanged(result) => Ok(result),
        }
    }
}
