//! Broker Transport Abstraction
//!
//! The connection manager talks to the broker only through [`BusTransport`],
//! so its reconnect policy can be exercised against a fake in tests.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

/// Error type for transport operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// No connection is established
    NotConnected,
    /// Connection to the broker failed or was lost
    ConnectionLost(String),
    /// Broker refused the connection
    Rejected(String),
    /// Operation timed out
    Timeout,
    /// Other error
    Other(String),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::NotConnected => write!(f, "Not connected"),
            BusError::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            BusError::Rejected(msg) => write!(f, "Rejected: {}", msg),
            BusError::Timeout => write!(f, "Operation timed out"),
            BusError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for BusError {}

/// State of the broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; the next publish will try to reconnect
    Disconnected,
    /// Connect or reconnect in progress
    Connecting,
    /// Connected and operational
    Connected,
}

/// A publish-only client connection to a broker
///
/// Implemented by [`MqttTransport`](super::MqttTransport) for real brokers.
/// Implementations own their background I/O and update the connection
/// state when the broker goes away; they never reconnect on their own.
#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Establish the connection and start background I/O
    async fn connect(&self) -> Result<(), BusError>;

    /// Re-establish a dropped connection
    async fn reconnect(&self) -> Result<(), BusError>;

    /// Current connection state
    fn state(&self) -> ConnectionState;

    /// Whether the connection is currently usable
    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Publish a message
    async fn publish(&self, topic: &str, payload: Bytes, retain: bool) -> Result<(), BusError>;

    /// Close the connection and stop background I/O
    async fn disconnect(&self) -> Result<(), BusError>;
}
