//! Gateway counters
//!
//! Counters shared by the request bridge, the connection manager and the
//! health reporter. They are Prometheus counters, so every update is an
//! atomic add and a snapshot can be taken from any task without locking.
//! The same registry can optionally be exposed at `/metrics`.

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use serde::Serialize;

mod server;

pub use server::MetricsServer;


/// Point-in-time view of the two counters published by the health reporter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Requests successfully published to the broker
    pub http_to_mqtt_count: u64,
    /// Successful reconnects to the broker
    pub mqtt_reconnect_count: u64,
}

/// All gateway metrics in one place
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    /// Bridged publishes that ended in a 200 response
    pub bridged_publishes: IntCounter,
    /// Successful reactive reconnects
    pub reconnects: IntCounter,
    /// Publishes that failed after a connection was available, or on reconnect
    pub publish_failures: IntCounter,
    /// HTTP responses by status code
    pub http_responses: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let bridged_publishes = IntCounter::with_opts(Opts::new(
            "http2mqtt_bridged_publishes_total",
            "HTTP requests published to the broker",
        ))
        .expect("valid metric options");

        let reconnects = IntCounter::with_opts(Opts::new(
            "http2mqtt_reconnects_total",
            "Successful reconnects to the broker",
        ))
        .expect("valid metric options");

        let publish_failures = IntCounter::with_opts(Opts::new(
            "http2mqtt_publish_failures_total",
            "Publishes that could not be handed to the broker",
        ))
        .expect("valid metric options");

        let http_responses = IntCounterVec::new(
            Opts::new("http2mqtt_http_responses_total", "HTTP responses by status"),
            &["status"],
        )
        .expect("valid metric options");

        registry
            .register(Box::new(bridged_publishes.clone()))
            .expect("metric registered once");
        registry
            .register(Box::new(reconnects.clone()))
            .expect("metric registered once");
        registry
            .register(Box::new(publish_failures.clone()))
            .expect("metric registered once");
        registry
            .register(Box::new(http_responses.clone()))
            .expect("metric registered once");

        Self {
            registry,
            bridged_publishes,
            reconnects,
            publish_failures,
            http_responses,
        }
    }

    /// Read both health counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            http_to_mqtt_count: self.bridged_publishes.get(),
            mqtt_reconnect_count: self.reconnects.get(),
        }
    }

    /// Count a response by its status code
    pub fn record_response(&self, status: u16) {
        let status = status.to_string();
        self.http_responses
            .with_label_values(&[status.as_str()])
            .inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
