use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when reading or writing a document.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document file could not be read or written.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document exists but does not hold valid JSON for its type.
    #[error("Corrupt document {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The document could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
