//! HTTP front door for the order saga.
//!
//! Serves the order ledger, cart, product/stock listing and the
//! notification stream, with structured logging (tracing) and Prometheus
//! metrics. The binary also hosts every saga participant in-process.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod warmup;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch};
use event_bus::EventBus;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;
pub use warmup::Warmup;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<B: EventBus + Clone + 'static>(
    state: Arc<AppState<B>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health::<B>))
        .route("/products", get(routes::products::list::<B>))
        .route("/stock", get(routes::products::stock::<B>))
        .route("/stock/{product_id}", get(routes::products::stock_for::<B>))
        .route(
            "/cart",
            get(routes::cart::list::<B>).post(routes::cart::add::<B>),
        )
        .route(
            "/cart/{client_id}/{product_id}/{quantity}",
            patch(routes::cart::update::<B>),
        )
        .route(
            "/cart/{client_id}/{product_id}",
            axum::routing::delete(routes::cart::remove::<B>),
        )
        .route(
            "/orders",
            get(routes::orders::list::<B>).post(routes::orders::create::<B>),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get::<B>)
                .delete(routes::orders::cancel::<B>)
                .post(routes::orders::cancel::<B>),
        )
        .route("/notifications", get(routes::notifications::stream::<B>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
