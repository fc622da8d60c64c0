use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::store::DocumentStore;
use crate::{Result, StoreError};

/// A document kept as one pretty-printed JSON file.
///
/// A missing file is created holding `D::default()`; an empty file reads as
/// `D::default()`. Invalid JSON is reported as [`StoreError::Corrupt`] and
/// never silently replaced.
#[derive(Debug)]
pub struct JsonFileStore<D> {
    path: PathBuf,
    _document: PhantomData<fn() -> D>,
}

impl<D> Clone for JsonFileStore<D> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _document: PhantomData,
        }
    }
}

impl<D> JsonFileStore<D> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _document: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl<D> DocumentStore<D> for JsonFileStore<D>
where
    D: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    async fn load(&self) -> Result<D> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let document = D::default();
                self.save(&document).await?;
                tracing::info!(path = %self.path.display(), "created empty document");
                return Ok(document);
            }
            Err(e) => return Err(self.io_error(e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(D::default());
        }

        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, document: &D) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(document)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| self.io_error(e))?;
        tracing::debug!(path = %self.path.display(), "document saved");
        Ok(())
    }
}
