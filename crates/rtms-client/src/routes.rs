//! HTTP routes for the RTMS client.
//!
//! Defines the Axum router and application state.

use crate::controller::SessionController;
use crate::handlers;
use crate::observability::{health_router, HealthState};

use axum::{
    routing::{get, post},
    Router,
};
use common::secret::SecretString;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across webhook handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session lifecycle entry points.
    pub controller: SessionController,

    /// Key for the URL validation token.
    pub webhook_secret: SecretString,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `POST {webhook_path}` - Control-plane webhook events
/// - `/health` - Liveness probe
/// - `/ready` - Readiness probe
/// - `/metrics` - Prometheus metrics endpoint
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(
    state: Arc<AppState>,
    webhook_path: &str,
    health_state: Arc<HealthState>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let webhook_routes = Router::new()
        .route(webhook_path, post(handlers::webhook_handler))
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    webhook_routes
        .merge(health_router(health_state))
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
