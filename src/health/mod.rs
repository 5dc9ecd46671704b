//! Health Reporter
//!
//! Periodically publishes the gateway counters as JSON to the health topic:
//!
//! ```json
//! {"http_to_mqtt_count": 12, "mqtt_reconnect_count": 1}
//! ```
//!
//! The first report goes out immediately, then one per interval. Reports only
//! go out on a live connection; a down broker is left for the next HTTP
//! publish to reconnect.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::bus::ConnectionManager;
use crate::metrics::Metrics;

pub struct HealthReporter {
    manager: Arc<ConnectionManager>,
    metrics: Arc<Metrics>,
    topic: String,
    interval: Duration,
}

impl HealthReporter {
    pub fn new(
        manager: Arc<ConnectionManager>,
        metrics: Arc<Metrics>,
        topic: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            manager,
            metrics,
            topic: topic.into(),
            interval,
        }
    }

    /// Publish one report. Failures are logged and swallowed.
    pub async fn report(&self) {
        let snapshot = self.metrics.snapshot();
        let payload = match serde_json::to_vec(&snapshot) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                warn!("Failed to encode health report: {}", e);
                return;
            }
        };

        match self
            .manager
            .publish_if_connected(&self.topic, payload, false)
            .await
        {
            Ok(()) => debug!(
                "Health report sent to '{}': {} bridged, {} reconnects",
                self.topic, snapshot.http_to_mqtt_count, snapshot.mqtt_reconnect_count
            ),
            Err(e) => warn!("Health report to '{}' skipped: {}", self.topic, e),
        }
    }

    /// Spawn the reporting task; it runs until the shutdown signal fires
    pub fn spawn(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // A slow publish must not be followed by a burst of catch-up reports
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.report().await,
                    _ = shutdown_rx.recv() => {
                        debug!("Health reporter shutting down");
                        break;
                    }
                }
            }
        })
    }
}
