//! Server binary for Horde.
//!
//! Wires the world grid, the zombie generator, the broadcaster, and the
//! `WebSocket` gateway together, then runs the game loop until a signal, the
//! tick limit, or a fatal error stops it.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (`horde-config.yaml`, then environment overrides)
//! 2. Initialize structured logging (tracing)
//! 3. Listen for Ctrl-C and `SIGTERM`
//! 4. Build the generator, broadcaster, and connector; start the gateway
//! 5. Run the game loop
//! 6. Tear down and log the result

mod app;
mod error;
mod logging;
mod signals;

use horde_core::{HordeConfig, ShutdownSignal};
use tracing::info;

use crate::app::App;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if startup fails or the game loop stops on a fatal
/// error; the process then exits non-zero.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = HordeConfig::load()?;

    // 2. Initialize structured logging.
    logging::init(&config.logging)?;
    info!("horde-engine starting");
    info!(
        host = config.server.host,
        port = config.server.port,
        ws_path = config.server.ws_path,
        origins = config.server.allowed_origins.len(),
        seed = config.generator.seed,
        tick_interval_ms = config.generator.tick_interval_ms,
        max_ticks = config.generator.max_ticks,
        overflow_policy = ?config.broadcast.overflow_policy,
        "Configuration loaded"
    );
    for (origin, allowed) in &config.server.allowed_origins {
        info!(origin, allowed, "Allowed origin");
    }

    // 3. Signal handling.
    let shutdown = ShutdownSignal::new();
    let signals = signals::spawn_listener(shutdown.clone());

    // 4. Start accepting connections.
    let app = App::start(config, shutdown).await?;
    info!(addr = %app.local_addr(), "Server ready");

    // 5-6. Run the game, then tear down.
    let summary = app.run().await?;
    signals.abort();

    info!(
        run_id = %summary.run_id,
        end_reason = ?summary.end_reason,
        ticks = summary.ticks,
        started_at = %summary.started_at,
        "horde-engine shutdown complete"
    );

    Ok(())
}
