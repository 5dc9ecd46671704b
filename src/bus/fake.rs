//! In-memory transport for tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::transport::{BusError, BusTransport, ConnectionState};

/// A message handed to the fake broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Published {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
}

pub(crate) struct FakeTransport {
    connected: AtomicBool,
    connect_ok: AtomicBool,
    publish_ok: AtomicBool,
    connect_calls: AtomicUsize,
    reconnect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    reconnect_delay: Duration,
    publish_delay: Mutex<Duration>,
    published: Mutex<Vec<Published>>,
}

impl FakeTransport {
    fn with_state(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            connect_ok: AtomicBool::new(true),
            publish_ok: AtomicBool::new(true),
            connect_calls: AtomicUsize::new(0),
            reconnect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            reconnect_delay: Duration::ZERO,
            publish_delay: Mutex::new(Duration::ZERO),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn connected() -> Self {
        Self::with_state(true)
    }

    pub fn disconnected() -> Self {
        Self::with_state(false)
    }

    /// Make reconnects take a while, to widen race windows
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Outcome of subsequent connect and reconnect calls
    pub fn set_connect_ok(&self, ok: bool) {
        self.connect_ok.store(ok, Ordering::SeqCst);
    }

    /// Outcome of subsequent publish calls
    pub fn set_publish_ok(&self, ok: bool) {
        self.publish_ok.store(ok, Ordering::SeqCst);
    }

    /// Make subsequent publishes take this long
    pub fn set_publish_delay(&self, delay: Duration) {
        *self.publish_delay.lock() = delay;
    }

    /// Simulate the broker going away
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn reconnect_calls(&self) -> usize {
        self.reconnect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().clone()
    }

    fn attempt_connect(&self) -> Result<(), BusError> {
        if self.connect_ok.load(Ordering::SeqCst) {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            self.connected.store(false, Ordering::SeqCst);
            Err(BusError::ConnectionLost("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl BusTransport for FakeTransport {
    async fn connect(&self) -> Result<(), BusError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.attempt_connect()
    }

    async fn reconnect(&self) -> Result<(), BusError> {
        self.reconnect_calls.fetch_add(1, Ordering::SeqCst);
        if !self.reconnect_delay.is_zero() {
            tokio::time::sleep(self.reconnect_delay).await;
        }
        self.attempt_connect()
    }

    fn state(&self) -> ConnectionState {
        if self.connected.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    async fn publish(&self, topic: &str, payload: Bytes, retain: bool) -> Result<(), BusError> {
        let delay = *self.publish_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BusError::NotConnected);
        }
        if !self.publish_ok.load(Ordering::SeqCst) {
            return Err(BusError::Other("publish rejected by client".to_string()));
        }
        self.published.lock().push(Published {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
