//! Axum router construction for the gateway.
//!
//! Assembles the health endpoint and the `WebSocket` upgrade route into a
//! single [`Router`]. CORS is restricted to the configured allow-list.

use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::routing::get;
use horde_core::config::HEALTH_PATH;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /health` -- liveness probe
/// - `GET {ws_path}` -- `WebSocket` upgrade (`/zombie` by default)
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(state.origins.header_values()))
        .allow_methods([Method::GET]);

    Router::new()
        .route(HEALTH_PATH, get(handlers::health))
        .route(&state.ws_path, get(handlers::ws_connect))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
