//! Broker Connection Configuration
//!
//! Settings for the single outbound MQTT connection used to publish bridged
//! requests and health snapshots.

use std::time::Duration;

use serde::Deserialize;

/// MQTT broker connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker hostname or IP address
    pub host: String,

    /// Broker TCP port
    pub port: u16,

    /// Username for broker authentication (only sent together with a password)
    pub username: String,

    /// Password for broker authentication
    pub password: String,

    /// Client identifier presented to the broker
    pub client_id: String,

    /// Keep alive interval in seconds, also the health report interval
    pub keepalive: u64,

    /// Timeout for establishing the connection and receiving CONNACK (e.g. "10s")
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Timeout for handing a PUBLISH to the client (e.g. "5s")
    #[serde(default = "default_publish_timeout", with = "humantime_serde")]
    pub publish_timeout: Duration,

    /// Capacity of the client's outgoing request queue
    pub request_capacity: usize,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_publish_timeout() -> Duration {
    Duration::from_secs(5)
}

pub(crate) fn default_client_id() -> String {
    format!("http2mqtt-{}", std::process::id())
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            client_id: default_client_id(),
            keepalive: 120,
            connect_timeout: default_connect_timeout(),
            publish_timeout: default_publish_timeout(),
            request_capacity: 64,
        }
    }
}

impl MqttConfig {
    /// Broker credentials, present only when both username and password are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() || self.password.is_empty() {
            None
        } else {
            Some((self.username.as_str(), self.password.as_str()))
        }
    }

    /// Get keep alive as Duration
    pub fn keepalive_duration(&self) -> Duration {
        Duration::from_secs(self.keepalive)
    }

    /// Broker address in `host:port` form, for logging
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
