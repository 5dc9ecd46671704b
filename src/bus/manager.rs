//! Connection Manager
//!
//! Owns the broker transport and applies the reconnect policy: a publish on a
//! dropped connection performs exactly one synchronous reconnect first.
//! There is no background retry loop.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use super::transport::{BusError, BusTransport};
use crate::metrics::Metrics;

/// Why a publish did not reach the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Not connected, and reconnecting failed
    Unavailable(BusError),
    /// Connected, but the publish itself failed
    Failed(BusError),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::Unavailable(e) => write!(f, "Broker unavailable: {}", e),
            PublishError::Failed(e) => write!(f, "Publish failed: {}", e),
        }
    }
}

impl std::error::Error for PublishError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PublishError::Unavailable(e) | PublishError::Failed(e) => Some(e),
        }
    }
}

/// Single long-lived broker connection shared by all request handlers and
/// the health reporter
pub struct ConnectionManager {
    transport: Arc<dyn BusTransport>,
    metrics: Arc<Metrics>,
    /// Serializes the check-reconnect-publish sequence so at most one
    /// reconnect is in flight
    publish_lock: tokio::sync::Mutex<()>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn BusTransport>, metrics: Arc<Metrics>) -> Self {
        Self {
            transport,
            metrics,
            publish_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Initial connection at startup. On failure the manager stays
    /// disconnected and publishes will try to reconnect.
    pub async fn connect(&self) -> Result<(), BusError> {
        let _guard = self.publish_lock.lock().await;
        self.transport.connect().await
    }

    /// Whether the broker connection is currently up
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Reconnect now, counting the reconnect on success
    pub async fn reconnect(&self) -> Result<(), BusError> {
        let _guard = self.publish_lock.lock().await;
        self.reconnect_locked().await
    }

    async fn reconnect_locked(&self) -> Result<(), BusError> {
        warn!("Broker disconnected, attempting to reconnect");
        match self.transport.reconnect().await {
            Ok(()) => {
                self.metrics.reconnects.inc();
                info!("Reconnected to broker");
                Ok(())
            }
            Err(e) => {
                error!("Reconnect failed: {}", e);
                Err(e)
            }
        }
    }

    /// Publish, reconnecting once first if the connection is down
    pub async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        retain: bool,
    ) -> Result<(), PublishError> {
        let _guard = self.publish_lock.lock().await;

        // Another caller may have reconnected while we waited for the lock
        if !self.transport.is_connected() {
            if let Err(e) = self.reconnect_locked().await {
                self.metrics.publish_failures.inc();
                return Err(PublishError::Unavailable(e));
            }
        }

        self.send(topic, payload, retain).await
    }

    /// Publish only if already connected; never reconnects
    pub async fn publish_if_connected(
        &self,
        topic: &str,
        payload: Bytes,
        retain: bool,
    ) -> Result<(), PublishError> {
        let _guard = self.publish_lock.lock().await;

        if !self.transport.is_connected() {
            return Err(PublishError::Unavailable(BusError::NotConnected));
        }

        self.send(topic, payload, retain).await
    }

    async fn send(&self, topic: &str, payload: Bytes, retain: bool) -> Result<(), PublishError> {
        match self.transport.publish(topic, payload, retain).await {
            Ok(()) => {
                debug!("Published to '{}'", topic);
                Ok(())
            }
            Err(e) => {
                error!("Publish to '{}' failed: {}", topic, e);
                self.metrics.publish_failures.inc();
                Err(PublishError::Failed(e))
            }
        }
    }

    /// Graceful shutdown of the broker connection
    pub async fn disconnect(&self) {
        let _guard = self.publish_lock.lock().await;
        if let Err(e) = self.transport.disconnect().await {
            warn!("Error while disconnecting from broker: {}", e);
        }
    }
}
