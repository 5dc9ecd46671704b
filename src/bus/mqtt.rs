//! MQTT Transport
//!
//! [`BusTransport`] backed by rumqttc. The client's event loop is polled by a
//! driver task while connected. When the driver sees a transport error or a
//! broker DISCONNECT it marks the connection `Disconnected` and stops polling;
//! it is only polled again by an explicit `connect` or `reconnect`, so an idle
//! gateway generates no reconnect traffic.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::transport::{BusError, BusTransport, ConnectionState};
use crate::config::MqttConfig;

impl From<ConnectionError> for BusError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::ConnectionRefused(code) => BusError::Rejected(format!("{:?}", code)),
            other => BusError::ConnectionLost(other.to_string()),
        }
    }
}

/// PUBLISH overhead besides topic and payload: fixed header byte, up to four
/// remaining-length bytes and the two-byte topic length. QoS 0 has no packet id.
const PUBLISH_OVERHEAD: usize = 7;

/// Largest QoS 0 PUBLISH that can carry `max_payload_size` bytes to any valid topic
pub fn max_publish_packet_size(max_payload_size: usize) -> usize {
    max_payload_size
        .saturating_add(u16::MAX as usize)
        .saturating_add(PUBLISH_OVERHEAD)
}

/// Connection to an MQTT broker
pub struct MqttTransport {
    config: MqttConfig,
    max_packet_size: usize,
    client: AsyncClient,
    event_loop: Arc<tokio::sync::Mutex<EventLoop>>,
    state: Arc<RwLock<ConnectionState>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Create a transport able to publish payloads of up to `max_payload_size`
    /// bytes; no network activity happens until `connect`
    pub fn new(config: MqttConfig, max_payload_size: usize) -> Self {
        let max_packet_size = max_publish_packet_size(max_payload_size);

        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(config.keepalive_duration());
        options.set_clean_session(true);
        options.set_max_packet_size(max_packet_size, max_packet_size);
        if let Some((username, password)) = config.credentials() {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, config.request_capacity);

        Self {
            config,
            max_packet_size,
            client,
            event_loop: Arc::new(tokio::sync::Mutex::new(event_loop)),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            driver: Mutex::new(None),
        }
    }

    /// Poll the event loop until the broker acknowledges the connection
    async fn await_connack(event_loop: &tokio::sync::Mutex<EventLoop>) -> Result<(), BusError> {
        let mut event_loop = event_loop.lock().await;
        loop {
            match event_loop.poll().await? {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(BusError::Rejected(format!("{:?}", ack.code)));
                    }
                    debug!("CONNACK received (session_present={})", ack.session_present);
                    return Ok(());
                }
                event => debug!("Event before CONNACK: {:?}", event),
            }
        }
    }

    /// Open the connection and start the driver task
    async fn establish(&self) -> Result<(), BusError> {
        self.stop_driver();
        *self.state.write() = ConnectionState::Connecting;

        let result = match timeout(
            self.config.connect_timeout,
            Self::await_connack(&self.event_loop),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BusError::Timeout),
        };

        match result {
            Ok(()) => {
                *self.state.write() = ConnectionState::Connected;
                self.spawn_driver();
                info!("Connected to broker at {}", self.config.address());
                Ok(())
            }
            Err(e) => {
                *self.state.write() = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Keep the event loop polled (keep alive, outgoing publishes) while connected
    fn spawn_driver(&self) {
        let event_loop = self.event_loop.clone();
        let state = self.state.clone();
        let address = self.config.address();

        let handle = tokio::spawn(async move {
            let mut event_loop = event_loop.lock_owned().await;
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("Broker at {} sent DISCONNECT", address);
                        break;
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        debug!("DISCONNECT sent to {}", address);
                        break;
                    }
                    Ok(Event::Incoming(Packet::PingResp)) => {
                        debug!("PINGRESP from {}", address);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Connection to broker at {} lost: {}", address, e);
                        break;
                    }
                }
            }
            *state.write() = ConnectionState::Disconnected;
        });

        *self.driver.lock() = Some(handle);
    }

    fn stop_driver(&self) {
        if let Some(handle) = self.driver.lock().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl BusTransport for MqttTransport {
    async fn connect(&self) -> Result<(), BusError> {
        debug!(
            "Connecting to broker at {} as '{}'",
            self.config.address(),
            self.config.client_id
        );
        self.establish().await
    }

    async fn reconnect(&self) -> Result<(), BusError> {
        debug!("Reconnecting to broker at {}", self.config.address());
        self.establish().await
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    async fn publish(&self, topic: &str, payload: Bytes, retain: bool) -> Result<(), BusError> {
        let len = payload.len();

        // The event loop would drop an oversize packet and the connection
        // with it, after the client already returned Ok
        let size = topic.len() + len + PUBLISH_OVERHEAD;
        if size > self.max_packet_size {
            return Err(BusError::Rejected(format!(
                "packet of {} bytes exceeds limit of {} bytes",
                size, self.max_packet_size
            )));
        }
        timeout(
            self.config.publish_timeout,
            self.client
                .publish(topic, QoS::AtMostOnce, retain, payload.to_vec()),
        )
        .await
        .map_err(|_| BusError::Timeout)?
        .map_err(|e| BusError::Other(e.to_string()))?;

        debug!("Published {} bytes to '{}'", len, topic);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        if !self.is_connected() {
            self.stop_driver();
            return Ok(());
        }

        let sent = timeout(self.config.publish_timeout, self.client.disconnect())
            .await
            .map_err(|_| BusError::Timeout)
            .and_then(|r| r.map_err(|e| BusError::Other(e.to_string())));

        // Let the driver flush the DISCONNECT before tearing it down
        let handle = self.driver.lock().take();
        if let Some(mut handle) = handle {
            if timeout(self.config.publish_timeout, &mut handle).await.is_err() {
                handle.abort();
            }
        }

        *self.state.write() = ConnectionState::Disconnected;
        info!("Disconnected from broker at {}", self.config.address());
        sent
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.stop_driver();
    }
}
