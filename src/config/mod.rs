//! Configuration Module
//!
//! Provides TOML-based configuration for http2mqtt with support for:
//! - HTTP listener, Basic authentication and payload limits
//! - Broker connection parameters
//! - Health reporting
//! - Optional Prometheus endpoint
//! - Environment variable overrides (HTTP2MQTT__* prefix)
//! - The flat variables of the classic gateway deployment (MQTT_SERVER, HTTP_PORT, ...)

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::Path;

use config::{Environment, File, FileFormat, Value};
use regex::Regex;
use serde::Deserialize;

pub use http::HttpConfig;
pub use mqtt::MqttConfig;

mod http;
mod mqtt;


/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("static regex is valid");
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
    /// HTTP front door configuration
    pub http: HttpConfig,
    /// Broker connection configuration
    pub mqtt: MqttConfig,
    /// Health reporter configuration
    pub health: HealthConfig,
    /// Prometheus endpoint configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Health reporter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Whether the periodic health publish runs
    pub enabled: bool,
    /// Topic the counters snapshot is published to
    pub topic: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            topic: "http2mqtt/health".to_string(),
        }
    }
}

/// Prometheus endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve /metrics on a separate listener
    pub enabled: bool,
    /// Bind address of that listener
    pub bind: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: SocketAddr::from(([0, 0, 0, 0], 9090)),
        }
    }
}

/// Largest payload a single PUBLISH can carry: the 268,435,455 byte
/// remaining-length ceiling minus the longest topic and its length prefix
pub const MAX_PAYLOAD_LIMIT: usize = 268_435_455 - 65_535 - 2;

/// Resolve a listener host (IP literal or hostname) and port.
/// IPv6 literals may be given with or without brackets.
fn resolve_bind(host: &str, port: &str) -> Result<SocketAddr, ConfigError> {
    let port: u16 = port.trim().parse().map_err(|_| {
        ConfigError::Validation(format!("HTTP_PORT '{}' is not a valid port", port))
    })?;

    let host = host.trim();
    let unbracketed = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if let Ok(ip) = unbracketed.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    (unbracketed, port)
        .to_socket_addrs()
        .map_err(|e| {
            ConfigError::Validation(format!("HTTP_HOST '{}' cannot be resolved: {}", host, e))
        })?
        .next()
        .ok_or_else(|| {
            ConfigError::Validation(format!("HTTP_HOST '{}' resolved to no address", host))
        })
}

/// Translate the flat variables used by classic gateway deployments into
/// config keys. `lookup` is normally `std::env::var(..).ok()`.
fn legacy_env_overrides<F>(lookup: F) -> Result<Vec<(&'static str, Value)>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    const STRING_KEYS: &[(&str, &str)] = &[
        ("MQTT_SERVER", "mqtt.host"),
        ("MQTT_PORT", "mqtt.port"),
        ("MQTT_USERNAME", "mqtt.username"),
        ("MQTT_PASSWORD", "mqtt.password"),
        ("MQTT_KEEPALIVE", "mqtt.keepalive"),
        ("HTTP_USER", "http.username"),
        ("HTTP_PASSWORD", "http.password"),
        ("MAX_PAYLOAD_SIZE", "http.max_payload_size"),
    ];

    let mut overrides: Vec<(&'static str, Value)> = STRING_KEYS
        .iter()
        .filter_map(|(var, key)| lookup(var).map(|v| (*key, Value::from(v))))
        .collect();

    // HTTP_HOST and HTTP_PORT together make up the bind address
    let host = lookup("HTTP_HOST");
    let port = lookup("HTTP_PORT");
    if host.is_some() || port.is_some() {
        let default_bind = HttpConfig::default().bind;
        let host = host.unwrap_or_else(|| default_bind.ip().to_string());
        let port = port.unwrap_or_else(|| default_bind.port().to_string());
        let bind = resolve_bind(&host, &port)?;
        overrides.push(("http.bind", Value::from(bind.to_string())));
    }

    if let Some(insecure) = lookup("ALLOW_INSECURE") {
        overrides.push((
            "http.allow_insecure",
            Value::from(insecure.eq_ignore_ascii_case("true")),
        ));
    }

    Ok(overrides)
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports three forms of environment variable usage, lowest precedence first:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. `HTTP2MQTT__` prefix with double underscores for nesting:
    ///    - `HTTP2MQTT__HTTP__BIND=0.0.0.0:8080` overrides `http.bind`
    ///    - `HTTP2MQTT__MQTT__HOST=broker` overrides `mqtt.host`
    /// 3. Flat deployment variables: `MQTT_SERVER`, `MQTT_PORT`, `MQTT_USERNAME`,
    ///    `MQTT_PASSWORD`, `MQTT_KEEPALIVE`, `HTTP_HOST`, `HTTP_PORT`, `HTTP_USER`,
    ///    `HTTP_PASSWORD`, `MAX_PAYLOAD_SIZE`, `ALLOW_INSECURE`
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("http.bind", "0.0.0.0:8088")?
            .set_default("http.ping_path", "/ping")?
            .set_default("http.max_payload_size", 1024 * 1024)?
            .set_default("http.allow_insecure", false)?
            .set_default("mqtt.host", "localhost")?
            .set_default("mqtt.port", 1883)?
            .set_default("mqtt.keepalive", 120)?
            .set_default("health.enabled", true)?
            .set_default("health.topic", "http2mqtt/health")?
            .set_default("metrics.enabled", false)?;

        let path = path.as_ref();
        if !path.as_os_str().is_empty() {
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    let substituted = substitute_env_vars(&content);
                    builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ConfigError::Io(e)),
            }
        }

        // Values stay strings and are converted per field on deserialize,
        // so "0123" remains "0123" for string fields
        builder = builder.add_source(Environment::with_prefix("HTTP2MQTT").separator("__"));

        for (key, value) in legacy_env_overrides(|var| std::env::var(var).ok())? {
            builder = builder.set_override(key, value)?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only (no file).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // The MQTT client refuses sub-5s keep alives and the health
        // reporter cannot tick on a zero interval
        if self.mqtt.keepalive < 5 {
            return Err(ConfigError::Validation(
                "mqtt.keepalive must be at least 5 seconds".to_string(),
            ));
        }

        if self.mqtt.host.is_empty() {
            return Err(ConfigError::Validation(
                "mqtt.host must not be empty".to_string(),
            ));
        }

        if self.mqtt.client_id.is_empty() {
            return Err(ConfigError::Validation(
                "mqtt.client_id must not be empty".to_string(),
            ));
        }

        if self.mqtt.connect_timeout.is_zero() || self.mqtt.publish_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "mqtt.connect_timeout and mqtt.publish_timeout must be non-zero".to_string(),
            ));
        }

        if self.mqtt.request_capacity == 0 {
            return Err(ConfigError::Validation(
                "mqtt.request_capacity must be non-zero".to_string(),
            ));
        }

        if self.http.max_payload_size == 0 || self.http.max_payload_size > MAX_PAYLOAD_LIMIT {
            return Err(ConfigError::Validation(format!(
                "http.max_payload_size must be between 1 and {} bytes",
                MAX_PAYLOAD_LIMIT
            )));
        }

        if !self.http.allow_insecure && self.http.username.is_empty() {
            return Err(ConfigError::Validation(
                "http.username is required unless http.allow_insecure is set".to_string(),
            ));
        }

        if !self.http.ping_path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "http.ping_path '{}' must start with '/'",
                self.http.ping_path
            )));
        }

        if self.health.enabled {
            crate::gateway::validate_topic_name(&self.health.topic).map_err(|e| {
                ConfigError::Validation(format!(
                    "health.topic '{}' is invalid: {}",
                    self.health.topic, e
                ))
            })?;
        }

        Ok(())
    }
}
