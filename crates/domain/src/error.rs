//! Domain error types.

use event_bus::BusError;
use storage::StoreError;
use thiserror::Error;

use crate::cart::CartError;
use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An order rule was violated.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// A cart rule was violated.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// The local store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The event bus could not take the event.
    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
