//! Shared application state for the gateway.

use std::sync::Arc;

use horde_core::config::ServerConfig;

use crate::connector::WebSocketConnector;
use crate::origin::OriginPolicy;

/// State shared by every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Accepts upgraded connections.
    pub connector: Arc<WebSocketConnector>,
    /// Origin allow-list for upgrades and CORS.
    pub origins: OriginPolicy,
    /// Path serving `WebSocket` upgrades.
    pub ws_path: String,
}

impl AppState {
    /// Build the state from the server section of the configuration.
    pub fn new(connector: Arc<WebSocketConnector>, config: &ServerConfig) -> Self {
        Self {
            connector,
            origins: OriginPolicy::new(config.allowed_origins.clone()),
            ws_path: config.ws_path.clone(),
        }
    }
}
