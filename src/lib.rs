//! http2mqtt - HTTP to MQTT gateway
//!
//! Every authenticated HTTP `GET` or `POST` becomes one MQTT PUBLISH: the URL
//! path is the topic and the request body is the payload. The gateway keeps a
//! single broker connection, reconnects on demand, and periodically publishes
//! its own counters to a health topic.

pub mod bus;
pub mod config;
pub mod gateway;
pub mod health;
pub mod metrics;
pub mod server;

pub use bus::{BusError, BusTransport, ConnectionManager, ConnectionState, MqttTransport, PublishError};
pub use config::Config;
pub use gateway::{Gateway, GatewayError};
pub use health::HealthReporter;
pub use metrics::{Metrics, MetricsServer, MetricsSnapshot};
pub use server::HttpServer;
