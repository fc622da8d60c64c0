use thiserror::Error;

/// Errors that can occur when talking to the bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The broker cannot be reached or refused the operation.
    #[error("Bus unavailable: {0}")]
    Unavailable(String),

    /// The connection was closed before or during the operation.
    #[error("Connection {0} is closed")]
    ConnectionClosed(u64),

    /// A binding pattern or routing key is malformed.
    #[error("Invalid routing pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The message body could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors returned by a [`MessageHandler`](crate::MessageHandler).
///
/// The variant decides what the subscriber loop does with the delivery.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// The message can never be processed (bad payload, unknown key).
    /// Sent straight to the dead-letter sink.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Processing failed but may succeed on redelivery.
    #[error("Handler failed: {0}")]
    Failed(String),
}

impl HandlerError {
    /// Returns true if the delivery should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Failed(_))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Malformed(err.to_string())
    }
}
