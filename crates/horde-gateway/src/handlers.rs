//! HTTP endpoint handlers.
//!
//! | Method | Path       | Description                          |
//! |--------|------------|--------------------------------------|
//! | `GET`  | `/health`  | Liveness probe                       |
//! | `GET`  | `/zombie`  | `WebSocket` upgrade (path configurable) |

use std::sync::Arc;

use axum::Json;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::state::AppState;
use crate::transport::split_websocket;

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Upgrade to a `WebSocket` and hand the socket to the connector.
///
/// Refused with `403` for a disallowed origin and `503` while the connector
/// is not listening. Both checks run before the upgrade request itself is
/// validated.
///
/// # Errors
///
/// Returns [`GatewayError`] when the upgrade is refused.
pub async fn ws_connect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, GatewayError> {
    state.origins.check(&headers)?;
    if !state.connector.is_listening() {
        return Err(GatewayError::NotListening);
    }
    let ws = ws?;

    let connector = Arc::clone(&state.connector);
    Ok(ws
        .on_failed_upgrade(|e| warn!(error = %e, "Could not upgrade connection"))
        .on_upgrade(move |socket| async move {
            info!("Client connected");
            let (writer, reader) = split_websocket(socket);
            if let Err(e) = connector.accept(writer, reader).await {
                warn!(error = %e, "Connection dropped before its session started");
            }
        }))
}
