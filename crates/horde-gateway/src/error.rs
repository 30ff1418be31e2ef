//! Error types for the gateway.
//!
//! [`GatewayError`] covers requests refused before a `WebSocket` upgrade and
//! converts into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. The other
//! enums describe connector and per-connection failures, which never reach
//! an HTTP client.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use horde_core::BroadcastError;

/// Requests refused by the gateway before upgrading.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The `Origin` header is missing or not on the allow-list.
    #[error("origin not allowed: {0}")]
    OriginRejected(String),

    /// The connector has not started listening, or has stopped.
    #[error("not accepting connections")]
    NotListening,

    /// The request is not a valid `WebSocket` upgrade.
    #[error("invalid upgrade request: {0}")]
    Upgrade(#[from] WebSocketUpgradeRejection),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::OriginRejected(_) => StatusCode::FORBIDDEN,
            Self::NotListening => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upgrade(rejection) => rejection.status(),
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Errors from [`Connector`](crate::connector::Connector) lifecycle calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    /// `listen_for_connections` was called a second time.
    #[error("connector is already listening")]
    AlreadyListening,
}

/// Failures of the on-connect hook.
#[derive(Debug, thiserror::Error)]
pub enum OnConnectError {
    /// A frame could not be encoded.
    #[error("could not encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    /// The session's outbound queue has no room left.
    #[error("outbound queue is full")]
    OutboxFull,

    /// The session's outbound queue is gone.
    #[error("outbound queue is closed")]
    OutboxClosed,
}

/// Why an accepted stream never became a running session.
#[derive(Debug, thiserror::Error)]
pub enum AcceptError {
    /// No on-connect hook has been installed yet.
    #[error("connector is not listening")]
    NotListening,

    /// The connector was stopped.
    #[error("connector is stopped")]
    Stopped,

    /// The on-connect hook failed; the stream was closed.
    #[error("on-connect hook failed: {0}")]
    OnConnect(#[from] OnConnectError),

    /// The broadcaster refused the subscription; the stream was closed.
    #[error("could not subscribe session: {0}")]
    Subscribe(#[from] BroadcastError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusals_map_to_status_codes() {
        let forbidden = GatewayError::OriginRejected(String::from("http://evil.test")).into_response();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let unavailable = GatewayError::NotListening.into_response();
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
