//! # Configuration Management
//!
//! Centralized configuration for servers and clients.
//!
//! This module provides structured configuration for the listening server,
//! the reconnecting client and logging: endpoints, queue capacities,
//! per-call deadlines, tick interval and frame limits.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Environment variables via `from_env()`
//! - Direct instantiation with defaults
//!
//! ## Validation
//! A configuration that fails validation is a fatal startup condition:
//! `Server::bind` and `Client::run` refuse to open any socket with it.
//! Deadlines must be finite and non-zero since they are the only thing that
//! bounds a stalled socket call.

use crate::core::frame::{DEFAULT_MAX_BODY_SIZE, MAX_ENCODABLE_BODY};
use crate::error::{NetworkError, Result};
use crate::transport::NetworkKind;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Upper bound accepted for any queue capacity
pub const MAX_QUEUE_SIZE: usize = 1_000_000;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| NetworkError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| NetworkError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| NetworkError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("NETWORK_SESSION_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(addr) = std::env::var("NETWORK_SESSION_CLIENT_ADDRESS") {
            config.client.address = addr;
        }

        if let Ok(network) = std::env::var("NETWORK_SESSION_NETWORK") {
            config.server.network = network.clone();
            config.client.network = network;
        }

        if let Some(val) = env_millis("NETWORK_SESSION_READ_DEADLINE_MS")? {
            config.server.read_deadline = val;
            config.client.read_deadline = val;
        }

        if let Some(val) = env_millis("NETWORK_SESSION_WRITE_DEADLINE_MS")? {
            config.server.write_deadline = val;
            config.client.write_deadline = val;
        }

        if let Some(val) = env_millis("NETWORK_SESSION_TICK_INTERVAL_MS")? {
            config.server.tick_interval = val;
        }

        if let Some(val) = env_millis("NETWORK_SESSION_RECONNECT_DELAY_MS")? {
            config.client.reconnect_delay = val;
        }

        Ok(config)
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        into_result(self.validate())
    }
}

fn env_millis(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| NetworkError::ConfigError(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn into_result(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(NetworkError::ConfigError(format!(
            "Configuration validation failed:\n  - {}",
            errors.join("\n  - ")
        )))
    }
}

fn validate_endpoint(errors: &mut Vec<String>, role: &str, network: &str, address: &str) {
    if network.is_empty() {
        errors.push(format!("{role} network cannot be empty"));
    } else if network.parse::<NetworkKind>().is_err() {
        errors.push(format!(
            "Unsupported {role} network: '{network}' (expected tcp, tcp4 or tcp6)"
        ));
    }

    if address.is_empty() {
        errors.push(format!("{role} address cannot be empty"));
    } else if !has_port(address) {
        errors.push(format!(
            "Invalid {role} address format: '{address}' (expected 'host:port' or ':port')"
        ));
    }
}

fn has_port(address: &str) -> bool {
    address
        .rsplit_once(':')
        .is_some_and(|(_, port)| port.parse::<u16>().is_ok())
}

fn validate_queue(errors: &mut Vec<String>, name: &str, size: usize) {
    if size == 0 {
        errors.push(format!("{name} must be greater than 0"));
    } else if size > MAX_QUEUE_SIZE {
        errors.push(format!(
            "{name} too large: {size} (max recommended: 1,000,000)"
        ));
    }
}

fn validate_deadline(errors: &mut Vec<String>, name: &str, value: Duration) {
    if value.is_zero() {
        errors.push(format!("{name} must be greater than 0"));
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Network kind: `tcp`, `tcp4` or `tcp6`
    pub network: String,

    /// Listen address (e.g., "127.0.0.1:9999" or ":9999")
    pub address: String,

    /// Capacity of each connection's outbound queue
    pub sender_queue_size: usize,

    /// Capacity of each connection's session-to-session inbound queue
    pub receiver_queue_size: usize,

    /// Capacity of each connection's dispatch mailbox
    pub mailbox_queue_size: usize,

    /// Deadline applied to every frame read
    #[serde(with = "duration_serde")]
    pub read_deadline: Duration,

    /// Deadline applied to every frame write
    #[serde(with = "duration_serde")]
    pub write_deadline: Duration,

    /// Per-connection tick period, zero disables ticking
    #[serde(with = "duration_serde", default)]
    pub tick_interval: Duration,

    /// Largest accepted frame body in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Time allowed for connections to drain on shutdown
    #[serde(with = "duration_serde", default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,
}

fn default_max_body_size() -> usize {
    DEFAULT_MAX_BODY_SIZE
}

fn default_shutdown_timeout() -> Duration {
    timeout::SHUTDOWN_TIMEOUT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: String::from("tcp"),
            address: String::from("127.0.0.1:9999"),
            sender_queue_size: 2,
            receiver_queue_size: 2,
            mailbox_queue_size: 64,
            read_deadline: timeout::DEFAULT_DEADLINE,
            write_deadline: timeout::DEFAULT_DEADLINE,
            tick_interval: Duration::ZERO,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        validate_endpoint(&mut errors, "Server", &self.network, &self.address);

        validate_queue(&mut errors, "Sender queue size", self.sender_queue_size);
        validate_queue(&mut errors, "Receiver queue size", self.receiver_queue_size);
        validate_queue(&mut errors, "Mailbox queue size", self.mailbox_queue_size);

        validate_deadline(&mut errors, "Read deadline", self.read_deadline);
        validate_deadline(&mut errors, "Write deadline", self.write_deadline);

        if self.max_body_size == 0 {
            errors.push("Max body size must be greater than 0".to_string());
        } else if self.max_body_size > MAX_ENCODABLE_BODY {
            errors.push(format!(
                "Max body size too large: {} bytes (wire limit: {MAX_ENCODABLE_BODY})",
                self.max_body_size
            ));
        }

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        into_result(self.validate())
    }

    /// Tick period if ticking is enabled
    pub fn tick(&self) -> Option<Duration> {
        (!self.tick_interval.is_zero()).then_some(self.tick_interval)
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Network kind: `tcp`, `tcp4` or `tcp6`
    pub network: String,

    /// Target server address
    pub address: String,

    /// Capacity of the inbound mailbox shared across reconnects
    pub mailbox_queue_size: usize,

    /// Deadline applied to every frame read
    #[serde(with = "duration_serde")]
    pub read_deadline: Duration,

    /// Deadline applied to every frame write
    #[serde(with = "duration_serde")]
    pub write_deadline: Duration,

    /// Limit for a single dial attempt
    #[serde(with = "duration_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Fixed wait after a failed dial
    #[serde(with = "duration_serde", default = "default_reconnect_delay")]
    pub reconnect_delay: Duration,

    /// Largest accepted frame body, unbounded when unset
    #[serde(default)]
    pub max_body_size: Option<usize>,
}

fn default_connect_timeout() -> Duration {
    timeout::DEFAULT_CONNECT_TIMEOUT
}

fn default_reconnect_delay() -> Duration {
    timeout::DEFAULT_RECONNECT_DELAY
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: String::from("tcp"),
            address: String::from("127.0.0.1:9999"),
            mailbox_queue_size: 8,
            read_deadline: timeout::DEFAULT_DEADLINE,
            write_deadline: timeout::DEFAULT_DEADLINE,
            connect_timeout: timeout::DEFAULT_CONNECT_TIMEOUT,
            reconnect_delay: timeout::DEFAULT_RECONNECT_DELAY,
            max_body_size: None,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        validate_endpoint(&mut errors, "Client", &self.network, &self.address);
        validate_queue(&mut errors, "Mailbox queue size", self.mailbox_queue_size);

        validate_deadline(&mut errors, "Read deadline", self.read_deadline);
        validate_deadline(&mut errors, "Write deadline", self.write_deadline);
        validate_deadline(&mut errors, "Connect timeout", self.connect_timeout);

        if self.reconnect_delay.is_zero() {
            errors.push("Reconnect delay must be greater than 0".to_string());
        } else if self.reconnect_delay.as_secs() > 300 {
            errors.push("Reconnect delay too long (maximum: 300s)".to_string());
        }

        if self.max_body_size == Some(0) {
            errors.push("Max body size must be greater than 0 when set".to_string());
        }

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        into_result(self.validate())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,

    /// `EnvFilter` directives overriding `log_level`
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("network-session"),
            log_level: Level::INFO,
            json_format: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
