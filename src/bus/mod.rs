//! Broker connection
//!
//! The gateway keeps one outbound connection to the broker. [`ConnectionManager`]
//! owns it and decides when to reconnect; [`BusTransport`] is the seam to the
//! MQTT client library ([`MqttTransport`]).
//!
//! # Connection states
//!
//! ```text
//! Disconnected --connect ok--> Connected
//! Connected --transport error / broker DISCONNECT--> Disconnected
//! Disconnected --reconnect ok (on next publish)--> Connected
//! ```

mod manager;
mod mqtt;
mod transport;

#[cfg(test)]
pub(crate) mod fake;
#[cfg(test)]
mod tests;

pub use manager::{ConnectionManager, PublishError};
pub use mqtt::{max_publish_packet_size, MqttTransport};
pub use transport::{BusError, BusTransport, ConnectionState};
