use async_trait::async_trait;

use crate::Result;

/// A whole-document store.
///
/// There is no partial-write protocol: `load` returns the full document and
/// `save` replaces it. Callers that mutate must go through
/// [`GuardedStore`](crate::GuardedStore) so concurrent cycles do not
/// overwrite each other.
#[async_trait]
pub trait DocumentStore<D>: Send + Sync
where
    D: Send + Sync + 'static,
{
    /// Loads the document, returning `D::default()`-style content if none exists yet.
    async fn load(&self) -> Result<D>;

    /// Replaces the stored document.
    async fn save(&self, document: &D) -> Result<()>;
}
