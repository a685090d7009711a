//! Configuration module
//!
//! TOML-based configuration with environment variable overrides
//! (`STOMPMQ__*` prefix) and `${VAR}` / `${VAR:-default}` substitution
//! inside the file. Missing file means defaults.

use std::net::SocketAddr;
use std::path::Path;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

use crate::broker::BrokerConfig;


/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Server configuration
    pub server: ServerConfig,
    /// Heartbeat configuration
    pub heartbeat: HeartbeatConfig,
    /// Frame and connection limits
    pub limits: LimitsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP bind address for the WebSocket listener
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Value for the CONNECTED `server` header
    #[serde(default = "default_server_name")]
    pub name: String,
    /// WebSocket upgrade path
    #[serde(default = "default_path")]
    pub path: String,
    /// Transport adapter selector; only "ws" is shipped
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_bind() -> SocketAddr {
    "0.0.0.0:15674".parse().unwrap()
}

fn default_server_name() -> String {
    format!("stompmq/{}", env!("CARGO_PKG_VERSION"))
}

fn default_path() -> String {
    "/stomp".to_string()
}

fn default_protocol() -> String {
    "ws".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            name: default_server_name(),
            path: default_path(),
            protocol: default_protocol(),
        }
    }
}

/// Heartbeat configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// How often the broker can send beacons (sx), in milliseconds
    #[serde(default = "default_heartbeat_interval")]
    pub send_interval_ms: u64,
    /// How often the broker wants to hear from clients (sy), in milliseconds
    #[serde(default = "default_heartbeat_interval")]
    pub receive_interval_ms: u64,
    /// Slack before declaring a receive timeout, in milliseconds
    #[serde(default = "default_error_margin")]
    pub error_margin_ms: u64,
}

fn default_heartbeat_interval() -> u64 {
    10_000
}

fn default_error_margin() -> u64 {
    1_000
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            send_interval_ms: default_heartbeat_interval(),
            receive_interval_ms: default_heartbeat_interval(),
            error_margin_ms: default_error_margin(),
        }
    }
}

/// Frame and connection limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum frame size in bytes
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Maximum concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_frame_size() -> usize {
    1024 * 1024
}

fn default_max_connections() -> usize {
    100_000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_frame_size: default_max_frame_size(),
            max_connections: default_max_connections(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, with `STOMPMQ__*` environment
    /// overrides. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("server.bind", "0.0.0.0:15674")?
            .set_default("server.name", default_server_name())?
            .set_default("server.path", "/stomp")?
            .set_default("server.protocol", "ws")?
            .set_default("heartbeat.send_interval_ms", 10_000)?
            .set_default("heartbeat.receive_interval_ms", 10_000)?
            .set_default("heartbeat.error_margin_ms", 1_000)?
            .set_default("limits.max_frame_size", 1024 * 1024)?
            .set_default("limits.max_connections", 100_000)?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Override with environment variables (STOMPMQ__SERVER__BIND, etc.)
        builder = builder.add_source(
            Environment::with_prefix("STOMPMQ")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: Config = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.protocol != "ws" {
            return Err(ConfigError::Validation(format!(
                "unknown transport protocol: {}",
                self.server.protocol
            )));
        }
        if self.limits.max_frame_size == 0 {
            return Err(ConfigError::Validation(
                "limits.max_frame_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Lower into the broker's runtime configuration.
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            bind_addr: self.server.bind,
            path: self.server.path.clone(),
            server_name: self.server.name.clone(),
            heartbeat: [
                self.heartbeat.send_interval_ms,
                self.heartbeat.receive_interval_ms,
            ],
            heartbeat_error_margin_ms: self.heartbeat.error_margin_ms,
            max_frame_size: self.limits.max_frame_size,
            max_connections: self.limits.max_connections,
        }
    }
}
