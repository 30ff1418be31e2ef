//! Error types for the server binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup and the game run.

/// Top-level error for the server binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: horde_core::ConfigError,
    },

    /// The tracing subscriber could not be installed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the logging failure.
        message: String,
    },

    /// The starting zombies do not fit the grid.
    #[error("generator error: {source}")]
    Generator {
        /// The underlying generator error.
        #[from]
        source: horde_world::GeneratorError,
    },

    /// The world snapshot could not be encoded.
    #[error("snapshot error: {source}")]
    Snapshot {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The connector refused to start listening.
    #[error("connector error: {source}")]
    Connector {
        /// The underlying connector error.
        #[from]
        source: horde_gateway::ConnectorError,
    },

    /// The gateway could not be started.
    #[error("gateway error: {source}")]
    Gateway {
        /// The underlying startup error.
        #[from]
        source: horde_gateway::StartupError,
    },

    /// The game loop stopped on a fatal error.
    #[error("game error: {source}")]
    Game {
        /// The underlying game error.
        #[from]
        source: horde_core::GameError,
    },
}
