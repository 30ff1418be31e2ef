//! Configuration loading and typed config structures for the Horde server.
//!
//! Configuration comes from an optional YAML file (`horde-config.yaml` in the
//! working directory, or the path in `HORDE_CONFIG`) and is then overridden
//! by environment variables:
//!
//! | Variable                | Field                          |
//! |-------------------------|--------------------------------|
//! | `GAME_HOST`             | `server.host`                  |
//! | `GAME_PORT`             | `server.port`                  |
//! | `ALLOWED_CORS_ORIGINS`  | `server.allowed_origins`       |
//! | `LOG_TYPE`              | `logging.format`               |
//! | `LOG_LEVEL`             | `logging.level`                |
//! | `GAME_SEED`             | `generator.seed`               |
//! | `GAME_TICK_INTERVAL_MS` | `generator.tick_interval_ms`   |
//!
//! Every field has a default, so a missing file and an empty environment
//! yield a runnable configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use horde_world::{WorldGrid, Zombie};
use serde::Deserialize;

use crate::broadcast::OverflowPolicy;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "horde-config.yaml";

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "HORDE_CONFIG";

/// Path of the health endpoint; not available as `server.ws_path`.
pub const HEALTH_PATH: &str = "/health";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment variable held a value that could not be used.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidEnv {
        /// The environment variable name.
        key: String,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A configuration value is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HordeConfig {
    /// HTTP listener and origin policy.
    #[serde(default)]
    pub server: ServerConfig,

    /// World grid dimensions.
    #[serde(default)]
    pub world: WorldConfig,

    /// Movement generator settings.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Fan-out settings.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Per-connection settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Shutdown settings.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl HordeConfig {
    /// Load configuration the way the server binary does.
    ///
    /// Reads the file named by `HORDE_CONFIG`, or [`DEFAULT_CONFIG_FILE`]
    /// when it exists, applies environment overrides, and validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, an
    /// environment value is unusable, or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// [`HordeConfig::load`] with an explicit environment lookup.
    ///
    /// A file named through `HORDE_CONFIG` must exist. Only the implicit
    /// [`DEFAULT_CONFIG_FILE`] may be absent, in which case the defaults
    /// are used.
    ///
    /// # Errors
    ///
    /// Same as [`HordeConfig::load`].
    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(named) => Self::from_file(Path::new(&named))?,
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file at the given path.
    ///
    /// No environment overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Override fields from the environment.
    ///
    /// `lookup` returns the value of an environment variable, or `None` when
    /// it is unset. Tests pass a closure over a map; the binary passes
    /// [`std::env::var`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] when a set variable cannot be
    /// parsed.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("GAME_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("GAME_PORT") {
            self.server.port = parse_env("GAME_PORT", &port)?;
        }
        if let Some(origins) = lookup("ALLOWED_CORS_ORIGINS") {
            self.server.allowed_origins = parse_allowed_origins(&origins)?;
        }
        if let Some(format) = lookup("LOG_TYPE") {
            self.logging.format = LogFormat::from_env_value(&format);
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.trim().to_lowercase();
        }
        if let Some(seed) = lookup("GAME_SEED") {
            self.generator.seed = parse_env("GAME_SEED", &seed)?;
        }
        if let Some(interval) = lookup("GAME_TICK_INTERVAL_MS") {
            self.generator.tick_interval_ms = parse_env("GAME_TICK_INTERVAL_MS", &interval)?;
        }
        Ok(())
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.width == 0 || self.world.height == 0 {
            return Err(ConfigError::Invalid {
                field: "world",
                reason: format!(
                    "grid must be at least 1x1, got {}x{}",
                    self.world.width, self.world.height
                ),
            });
        }
        if self.generator.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "generator.tick_interval_ms",
                reason: String::from("must be greater than zero"),
            });
        }
        if self.generator.zombies.is_empty() {
            return Err(ConfigError::Invalid {
                field: "generator.zombies",
                reason: String::from("at least one zombie is required"),
            });
        }
        let grid = self.world.grid();
        if let Some(zombie) = self
            .generator
            .zombies
            .iter()
            .find(|z| !grid.contains_cell(z.x, z.y))
        {
            return Err(ConfigError::Invalid {
                field: "generator.zombies",
                reason: format!(
                    "zombie {} at ({}, {}) is outside the {}x{} grid",
                    zombie.id, zombie.x, zombie.y, self.world.width, self.world.height
                ),
            });
        }
        if self.broadcast.subscriber_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "broadcast.subscriber_capacity",
                reason: String::from("must be greater than zero"),
            });
        }
        if self.session.inbound_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "session.inbound_capacity",
                reason: String::from("must be greater than zero"),
            });
        }
        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "server.ws_path",
                reason: format!("must start with '/', got {:?}", self.server.ws_path),
            });
        }
        if self.server.ws_path == HEALTH_PATH {
            return Err(ConfigError::Invalid {
                field: "server.ws_path",
                reason: format!("{HEALTH_PATH} is reserved for the health check"),
            });
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        key: key.to_owned(),
        value: value.to_owned(),
        reason: e.to_string(),
    })
}

/// Parse an origin allow-list.
///
/// The input is a comma-separated list. Each item is either a bare origin
/// (allowed) or `origin=true` / `origin=false`. Blank items are skipped.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnv`] for an item whose flag is not a
/// boolean.
pub fn parse_allowed_origins(raw: &str) -> Result<BTreeMap<String, bool>, ConfigError> {
    let mut origins = BTreeMap::new();
    for item in raw.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let (origin, allowed) = match item.split_once('=') {
            Some((origin, flag)) => {
                let allowed = flag.trim().to_lowercase().parse::<bool>().map_err(|e| {
                    ConfigError::InvalidEnv {
                        key: String::from("ALLOWED_CORS_ORIGINS"),
                        value: item.to_owned(),
                        reason: e.to_string(),
                    }
                })?;
                (origin.trim(), allowed)
            }
            None => (item, true),
        };
        origins.insert(origin.to_owned(), allowed);
    }
    Ok(origins)
}

/// HTTP listener and connection policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path that accepts `WebSocket` upgrades.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Origin allow-list, consulted once per upgrade attempt.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: BTreeMap<String, bool>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// World grid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Grid width in cells.
    #[serde(default = "default_grid_side")]
    pub width: u16,

    /// Grid height in cells.
    #[serde(default = "default_grid_side")]
    pub height: u16,

    /// Send the dense tile matrix in the snapshot.
    #[serde(default)]
    pub include_tiles: bool,
}

impl WorldConfig {
    /// Build the configured grid.
    pub const fn grid(&self) -> WorldGrid {
        if self.include_tiles {
            WorldGrid::with_tiles(self.width, self.height)
        } else {
            WorldGrid::new(self.width, self.height)
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: default_grid_side(),
            height: default_grid_side(),
            include_tiles: false,
        }
    }
}

/// Movement generator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeneratorConfig {
    /// RNG seed; the same seed replays the same moves.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Stop the game after this many ticks (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Starting zombies.
    #[serde(default = "default_zombies")]
    pub zombies: Vec<Zombie>,
}

impl GeneratorConfig {
    /// Tick interval as a [`Duration`].
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            tick_interval_ms: default_tick_interval_ms(),
            max_ticks: 0,
            zombies: default_zombies(),
        }
    }
}

/// Fan-out configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BroadcastConfig {
    /// Outbound queue length per subscriber.
    #[serde(default = "default_channel_capacity")]
    pub subscriber_capacity: usize,

    /// What to do when a subscriber's queue is full.
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_channel_capacity(),
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

/// Per-connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Capacity of the shared inbound channel.
    #[serde(default = "default_channel_capacity")]
    pub inbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: default_channel_capacity(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable development output.
    Pretty,
}

impl LogFormat {
    /// Interpret a `LOG_TYPE` value. `json` in any case selects JSON;
    /// anything else selects the development format.
    pub fn from_env_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Default filter directive, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShutdownConfig {
    /// How long to wait for sessions to close after cancellation.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

impl ShutdownConfig {
    /// Grace period as a [`Duration`].
    pub const fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    8080
}

fn default_ws_path() -> String {
    String::from("/zombie")
}

fn default_allowed_origins() -> BTreeMap<String, bool> {
    BTreeMap::from([(String::from("http://localhost:3000"), true)])
}

const fn default_grid_side() -> u16 {
    30
}

const fn default_seed() -> u64 {
    45
}

const fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_zombies() -> Vec<Zombie> {
    vec![Zombie::new("1", 10, 5)]
}

const fn default_channel_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    String::from("info")
}

const fn default_grace_period_ms() -> u64 {
    5000
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = HordeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.ws_path, "/zombie");
        assert_eq!(config.world.width, 30);
        assert_eq!(config.generator.seed, 45);
        assert_eq!(config.generator.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.generator.zombies, vec![Zombie::new("1", 10, 5)]);
        assert_eq!(config.broadcast.overflow_policy, OverflowPolicy::Disconnect);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9000
  ws_path: "/ws"
  allowed_origins:
    "https://game.example": true
    "https://evil.example": false
world:
  width: 20
  height: 10
  include_tiles: true
generator:
  seed: 7
  tick_interval_ms: 250
  max_ticks: 100
  zombies:
    - { id: "a", x: 1, y: 1 }
    - { id: "b", x: 19, y: 9 }
broadcast:
  subscriber_capacity: 8
  overflow_policy: drop_message
session:
  inbound_capacity: 4
logging:
  format: pretty
  level: debug
shutdown:
  grace_period_ms: 100
"#;
        let config = HordeConfig::parse(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.server.allowed_origins.get("https://evil.example"),
            Some(&false)
        );
        assert!(config.world.grid().includes_tiles());
        assert_eq!(config.generator.zombies.len(), 2);
        assert_eq!(config.broadcast.overflow_policy, OverflowPolicy::DropMessage);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.shutdown.grace_period(), Duration::from_millis(100));
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = HordeConfig::parse("world:\n  width: 12\n").unwrap();
        assert_eq!(config.world.width, 12);
        assert_eq!(config.world.height, 30);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = HordeConfig::default();
        config
            .apply_env_overrides(env(&[
                ("GAME_PORT", "9999"),
                ("LOG_TYPE", "console"),
                ("LOG_LEVEL", "DEBUG"),
                ("GAME_SEED", "1"),
                ("ALLOWED_CORS_ORIGINS", "http://a.test, http://b.test=false"),
            ]))
            .unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.generator.seed, 1);
        assert_eq!(
            config.server.allowed_origins,
            BTreeMap::from([
                (String::from("http://a.test"), true),
                (String::from("http://b.test"), false),
            ])
        );
    }

    #[test]
    fn bad_env_value_is_reported() {
        let mut config = HordeConfig::default();
        let err = config
            .apply_env_overrides(env(&[("GAME_PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref key, .. } if key == "GAME_PORT"));
    }

    #[test]
    fn log_type_is_case_insensitive() {
        assert_eq!(LogFormat::from_env_value("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value("text"), LogFormat::Pretty);
    }

    #[test]
    fn origin_list_parsing() {
        assert!(parse_allowed_origins("").unwrap().is_empty());
        assert_eq!(parse_allowed_origins(" , http://x.test ,").unwrap().len(), 1);
        assert!(parse_allowed_origins("http://x.test=maybe").is_err());
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut config = HordeConfig::default();
        config.generator.zombies = vec![Zombie::new("1", 30, 0)];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "generator.zombies", .. })
        ));

        let mut config = HordeConfig::default();
        config.world.height = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "world", .. })));

        let mut config = HordeConfig::default();
        config.broadcast.subscriber_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = HordeConfig::default();
        config.server.ws_path = String::from("zombie");
        assert!(config.validate().is_err());
    }

    #[test]
    fn named_config_file_must_exist() {
        let result = HordeConfig::load_with(env(&[(
            CONFIG_PATH_ENV,
            "/nonexistent/horde/horde-config.yaml",
        )]));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn named_config_file_is_loaded_then_overridden() {
        let path = std::env::temp_dir().join(format!("horde-config-{}.yaml", std::process::id()));
        std::fs::write(&path, "server:\n  port: 9100\ngenerator:\n  seed: 7\n").unwrap();

        let config = HordeConfig::load_with(env(&[
            (CONFIG_PATH_ENV, path.to_str().unwrap()),
            ("GAME_SEED", "11"),
        ]))
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.generator.seed, 11);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(
            HordeConfig::parse("world: [1, 2"),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
