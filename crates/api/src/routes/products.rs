//! Product catalog and stock endpoints, served from the inventory.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ProductId;
use event_bus::EventBus;
use saga::Product;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /products: the inventory's stock listing as seen by the front door.
#[tracing::instrument(skip(state))]
pub async fn list<B: EventBus + Clone + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Result<Json<Vec<Product>>, ApiError> {
    state
        .catalog
        .products()
        .await
        .map(Json)
        .map_err(|e| ApiError::Internal(format!("Inventory unavailable: {e}")))
}

/// GET /stock: every product with its current stock.
#[tracing::instrument(skip(state))]
pub async fn stock<B: EventBus + Clone + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.catalog.products().await?))
}

/// GET /stock/{productId}
#[tracing::instrument(skip(state))]
pub async fn stock_for<B: EventBus + Clone + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(product_id): Path<u64>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.catalog.product(ProductId::new(product_id)).await?))
}
