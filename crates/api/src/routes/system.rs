//! Liveness and Prometheus scrape endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use event_bus::EventBus;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub notification_listeners: usize,
}

/// GET /health
pub async fn health<B: EventBus + Clone + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        notification_listeners: state.relay.listener_count(),
    })
}

/// GET /metrics: Prometheus text format.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
