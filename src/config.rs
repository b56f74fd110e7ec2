//! Configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bot configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Process-level settings (HTTP liveness/metrics).
    #[serde(default)]
    pub server: ServerConfig,
    /// Command surface settings.
    #[serde(default)]
    pub bot: BotConfig,
    /// Reconciliation core tuning.
    #[serde(default)]
    pub mirror: MirrorConfig,
    /// Database configuration. When absent the bot runs without
    /// persistence and tracked channels do not survive restarts.
    pub database: Option<DatabaseConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is not an error: every field has a default and the
    /// Discord token comes from the environment, so the bot can run with
    /// no config at all.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.as_ref().display(), "No config file, using defaults");
                return Ok(Config::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Process-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port for the liveness + Prometheus metrics HTTP endpoint
    /// (default: 8080, 0 disables). The `PORT` environment variable
    /// overrides this on hosting platforms that assign ports.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
        }
    }
}

impl ServerConfig {
    /// Effective HTTP port after applying the `PORT` env override.
    pub fn effective_http_port(&self) -> u16 {
        std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(self.http_port)
    }
}

fn default_http_port() -> u16 {
    8080
}

/// Command surface settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Prefix for text commands (default: "!!").
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
        }
    }
}

fn default_command_prefix() -> String {
    "!!".to_string()
}

/// Reconciliation core tuning.
///
/// The defaults match long-running production use: a 5 minute debounce
/// before an empty channel is renamed to "0 users", a 3 minute repair
/// sweep, and a 60 second fallback backoff when the platform rate-limits
/// a rename without suggesting a retry delay.
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    /// Marker substring identifying the status category (case-insensitive).
    #[serde(default = "default_status_category")]
    pub status_category: String,
    /// Fixed label for the server-wide aggregate mirror.
    #[serde(default = "default_aggregate_label")]
    pub aggregate_label: String,
    /// Seconds a channel must stay empty before the forced "0 users"
    /// rename is pushed.
    #[serde(default = "default_zero_debounce_secs")]
    pub zero_debounce_secs: u64,
    /// Interval of the periodic consistency sweep, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Fallback cooldown after a rate-limit response that carried no
    /// retry-after hint, in seconds.
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            status_category: default_status_category(),
            aggregate_label: default_aggregate_label(),
            zero_debounce_secs: default_zero_debounce_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            rate_limit_backoff_secs: default_rate_limit_backoff_secs(),
        }
    }
}

fn default_status_category() -> String {
    "STATUS".to_string()
}

fn default_aggregate_label() -> String {
    "Study/Work".to_string()
}

fn default_zero_debounce_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    180
}

fn default_rate_limit_backoff_secs() -> u64 {
    60
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    pub path: String,
}
