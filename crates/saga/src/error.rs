//! Saga participant error types.

use common::ProductId;
use domain::DomainError;
use event_bus::{BusError, HandlerError};
use storage::StoreError;
use thiserror::Error;

/// Errors raised by the inventory store.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl InventoryError {
    /// Business rejections are final; only storage failures are worth retrying.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            InventoryError::ProductNotFound(_) | InventoryError::InsufficientStock { .. }
        )
    }
}

/// Errors raised while talking to the payment gateway.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The gateway could not be reached or timed out.
    #[error("Payment gateway unreachable: {0}")]
    Transport(String),

    /// The gateway answered with a non-success HTTP status.
    #[error("Payment gateway rejected the request with status {status}")]
    Rejected { status: u16 },

    /// The gateway answered but the body was not a verdict.
    #[error("Unexpected payment gateway response: {0}")]
    UnexpectedResponse(String),
}

impl From<reqwest::Error> for PaymentError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            PaymentError::Rejected {
                status: status.as_u16(),
            }
        } else if e.is_decode() {
            PaymentError::UnexpectedResponse(e.to_string())
        } else {
            PaymentError::Transport(e.to_string())
        }
    }
}

/// Errors that can occur while wiring or running participants.
#[derive(Debug, Error)]
pub enum SagaError {
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

/// Maps a failed local effect to a redeliverable handler failure.
pub(crate) fn retryable(e: impl std::fmt::Display) -> HandlerError {
    HandlerError::Failed(e.to_string())
}
