//! Route configuration.

use axum::{Router, routing::get};
use tower::ServiceBuilder;

use crate::api::handlers::health_handler;
use crate::api::middleware;
use crate::state::AppState;

/// Builds the worker router.
///
/// # Endpoints
///
/// - `GET /health` - Component health, 503 when degraded
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .layer(ServiceBuilder::new().layer(middleware::tracing::layer(true)))
        .with_state(state)
}
