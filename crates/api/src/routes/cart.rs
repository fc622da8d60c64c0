//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{ClientId, ProductId};
use domain::{AddToCart, CartItem};
use event_bus::EventBus;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartQuery {
    pub client_id: Option<u64>,
}

/// GET /cart: all lines, or one client's with `?clientId=`.
#[tracing::instrument(skip(state))]
pub async fn list<B: EventBus + Clone + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<CartQuery>,
) -> Result<Json<Vec<CartItem>>, ApiError> {
    let items = match query.client_id {
        Some(client_id) => state.cart.list_for_client(ClientId::new(client_id)).await?,
        None => state.cart.list().await?,
    };
    Ok(Json(items))
}

/// POST /cart: add a product, accumulating quantity for an existing line.
#[tracing::instrument(skip(state, req))]
pub async fn add<B: EventBus + Clone + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<AddToCart>,
) -> Result<(StatusCode, Json<CartItem>), ApiError> {
    let item = state.cart.add(req).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// PATCH /cart/{clientId}/{productId}/{quantity}
#[tracing::instrument(skip(state))]
pub async fn update<B: EventBus + Clone + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path((client_id, product_id, quantity)): Path<(u64, u64, i64)>,
) -> Result<Json<CartItem>, ApiError> {
    let item = state
        .cart
        .update_quantity(ClientId::new(client_id), ProductId::new(product_id), quantity)
        .await?;
    Ok(Json(item))
}

/// DELETE /cart/{clientId}/{productId}
#[tracing::instrument(skip(state))]
pub async fn remove<B: EventBus + Clone + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path((client_id, product_id)): Path<(u64, u64)>,
) -> Result<Json<CartItem>, ApiError> {
    let item = state
        .cart
        .remove(ClientId::new(client_id), ProductId::new(product_id))
        .await?;
    Ok(Json(item))
}
