//! Gateway startup helper for embedding in the server binary.
//!
//! [`spawn_gateway`] binds the listener eagerly, so a busy port fails
//! startup, then serves on a background Tokio task alongside the game
//! loop.

use std::net::SocketAddr;
use std::sync::Arc;

use horde_core::ShutdownSignal;
use horde_core::config::ServerConfig;
use tokio::task::JoinHandle;

use crate::server::{self, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the gateway.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// A gateway running on a background task.
#[derive(Debug)]
pub struct GatewayHandle {
    /// The bound address (useful when port `0` was requested).
    pub local_addr: SocketAddr,
    /// The serving task. Completes after the shutdown signal fires.
    pub task: JoinHandle<()>,
}

/// Bind and serve the gateway on a background task.
///
/// If serving fails the error is logged and `shutdown` is triggered so the
/// rest of the process stops too.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the address cannot be bound.
pub async fn spawn_gateway(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: ShutdownSignal,
) -> Result<GatewayHandle, StartupError> {
    let listener = server::bind(config).await?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("could not read bound address: {e}")))?;

    let task = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state, shutdown.clone()).await {
            tracing::error!(error = %e, "Gateway exited with error");
            shutdown.trigger();
        }
    });

    tracing::info!(%local_addr, "Gateway spawned on background task");

    Ok(GatewayHandle { local_addr, task })
}
