//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{CartError, DomainError, OrderError};
use saga::InventoryError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Inventory error.
    Inventory(InventoryError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Inventory(err) => inventory_error_to_response(err),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    let status = match &err {
        DomainError::Order(order_err) => match order_err {
            OrderError::InvalidQuantity { .. } => StatusCode::BAD_REQUEST,
            OrderError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            OrderError::AlreadyShipped(_) | OrderError::InvalidStateTransition { .. } => {
                StatusCode::CONFLICT
            }
        },
        DomainError::Cart(cart_err) => match cart_err {
            CartError::InvalidQuantity { .. } => StatusCode::BAD_REQUEST,
            CartError::ItemNotFound { .. } => StatusCode::NOT_FOUND,
        },
        DomainError::Bus(_) => StatusCode::SERVICE_UNAVAILABLE,
        DomainError::Store(_) | DomainError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

fn inventory_error_to_response(err: InventoryError) -> (StatusCode, String) {
    let status = match &err {
        InventoryError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        InventoryError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
        InventoryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}
