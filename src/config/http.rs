//! HTTP Front Door Configuration

use std::net::SocketAddr;

use serde::Deserialize;

/// HTTP listener and request bridge configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// TCP bind address for the HTTP listener
    pub bind: SocketAddr,

    /// Liveness path answered without authentication or broker access
    pub ping_path: String,

    /// Basic authentication username
    pub username: String,

    /// Basic authentication password
    pub password: String,

    /// Maximum accepted request body size in bytes
    pub max_payload_size: usize,

    /// Skip Basic authentication entirely
    pub allow_insecure: bool,

    /// Seconds to wait for in-flight requests on shutdown
    pub shutdown_grace: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8088)),
            ping_path: "/ping".to_string(),
            username: "user".to_string(),
            password: "password".to_string(),
            max_payload_size: 1024 * 1024,
            allow_insecure: false,
            shutdown_grace: 5,
        }
    }
}
