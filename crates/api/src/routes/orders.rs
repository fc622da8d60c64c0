//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::{NewOrder, Order};
use event_bus::EventBus;

use crate::error::ApiError;
use crate::state::AppState;

/// POST /orders: create an order and start the saga.
///
/// Responds once `order.created` is published; the order's later statuses
/// show up on `GET /orders/{id}` and the notification stream.
#[tracing::instrument(skip(state, req))]
pub async fn create<B: EventBus + Clone + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.ledger.create_order(req).await?;
    state.warmup.ping_all();
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders
#[tracing::instrument(skip(state))]
pub async fn list<B: EventBus + Clone + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.ledger.list_orders().await?))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<B: EventBus + Clone + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(id): Path<u64>,
) -> Result<Json<Order>, ApiError> {
    state
        .ledger
        .get_order(OrderId::new(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))
}

/// DELETE /orders/{id} (also POST): cancel an order.
#[tracing::instrument(skip(state))]
pub async fn cancel<B: EventBus + Clone + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(id): Path<u64>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.ledger.cancel_order(OrderId::new(id)).await?))
}
