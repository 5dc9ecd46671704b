//! Connection manager tests

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use pretty_assertions::assert_eq;

use super::fake::{FakeTransport, Published};
use super::*;
use crate::metrics::Metrics;

fn manager_with(transport: FakeTransport) -> (ConnectionManager, Arc<FakeTransport>, Arc<Metrics>) {
    let transport = Arc::new(transport);
    let metrics = Arc::new(Metrics::new());
    let manager = ConnectionManager::new(transport.clone(), metrics.clone());
    (manager, transport, metrics)
}

#[tokio::test]
async fn test_publish_when_connected_does_not_reconnect() {
    let (manager, transport, metrics) = manager_with(FakeTransport::connected());

    manager
        .publish("sensors/temp", Bytes::from_static(b"21.5"), false)
        .await
        .unwrap();

    assert_eq!(transport.reconnect_calls(), 0);
    assert_eq!(metrics.snapshot().mqtt_reconnect_count, 0);
    assert_eq!(
        transport.published(),
        vec![Published {
            topic: "sensors/temp".to_string(),
            payload: Bytes::from_static(b"21.5"),
            retain: false,
        }]
    );
}

#[tokio::test]
async fn test_publish_when_disconnected_reconnects_once() {
    let (manager, transport, metrics) = manager_with(FakeTransport::disconnected());
    assert!(!manager.is_connected());

    manager
        .publish("a/b", Bytes::from_static(b"x"), false)
        .await
        .unwrap();

    assert_eq!(transport.reconnect_calls(), 1);
    assert_eq!(metrics.snapshot().mqtt_reconnect_count, 1);
    assert_eq!(transport.published().len(), 1);
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_reconnect_failure_is_unavailable_and_counts_nothing() {
    let transport = FakeTransport::disconnected();
    transport.set_connect_ok(false);
    let (manager, transport, metrics) = manager_with(transport);

    let err = manager
        .publish("a/b", Bytes::from_static(b"x"), false)
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::Unavailable(_)));
    assert_eq!(transport.reconnect_calls(), 1);
    assert_eq!(metrics.snapshot().mqtt_reconnect_count, 0);
    assert!(transport.published().is_empty());
    assert_eq!(metrics.publish_failures.get(), 1);
}

#[tokio::test]
async fn test_publish_error_after_connection_is_failed() {
    let transport = FakeTransport::connected();
    transport.set_publish_ok(false);
    let (manager, transport, metrics) = manager_with(transport);

    let err = manager
        .publish("a/b", Bytes::from_static(b"x"), false)
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::Failed(_)));
    assert_eq!(transport.reconnect_calls(), 0);
    assert_eq!(metrics.publish_failures.get(), 1);
}

#[tokio::test]
async fn test_connection_drop_then_recovery() {
    let (manager, transport, metrics) = manager_with(FakeTransport::connected());

    manager.publish("t", Bytes::new(), false).await.unwrap();
    transport.drop_connection();
    manager.publish("t", Bytes::new(), false).await.unwrap();
    manager.publish("t", Bytes::new(), false).await.unwrap();

    assert_eq!(transport.reconnect_calls(), 1);
    assert_eq!(metrics.snapshot().mqtt_reconnect_count, 1);
    assert_eq!(transport.published().len(), 3);
}

#[tokio::test]
async fn test_every_successful_reconnect_is_counted() {
    let (manager, transport, metrics) = manager_with(FakeTransport::connected());

    for _ in 0..3 {
        transport.drop_connection();
        manager.publish("t", Bytes::new(), false).await.unwrap();
    }

    assert_eq!(metrics.snapshot().mqtt_reconnect_count, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishes_share_one_reconnect() {
    let transport = FakeTransport::disconnected().with_reconnect_delay(Duration::from_millis(50));
    let (manager, transport, metrics) = manager_with(transport);
    let manager = Arc::new(manager);

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .publish(&format!("t/{}", i), Bytes::new(), false)
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(transport.reconnect_calls(), 1);
    assert_eq!(metrics.snapshot().mqtt_reconnect_count, 1);
    assert_eq!(transport.published().len(), 8);
}

#[tokio::test]
async fn test_publish_if_connected_never_reconnects() {
    let (manager, transport, metrics) = manager_with(FakeTransport::disconnected());

    let err = manager
        .publish_if_connected("health", Bytes::new(), false)
        .await
        .unwrap_err();

    assert_eq!(err, PublishError::Unavailable(BusError::NotConnected));
    assert_eq!(transport.reconnect_calls(), 0);
    assert_eq!(metrics.snapshot().mqtt_reconnect_count, 0);
}

#[tokio::test]
async fn test_retain_flag_is_passed_through() {
    let (manager, transport, _) = manager_with(FakeTransport::connected());
    manager.publish("state", Bytes::new(), true).await.unwrap();
    assert!(transport.published()[0].retain);
}

#[tokio::test]
async fn test_connect_failure_is_reported_and_recoverable() {
    let transport = FakeTransport::disconnected();
    transport.set_connect_ok(false);
    let (manager, transport, _) = manager_with(transport);

    assert!(manager.connect().await.is_err());
    assert!(!manager.is_connected());
    assert_eq!(transport.connect_calls(), 1);

    transport.set_connect_ok(true);
    manager.publish("t", Bytes::new(), false).await.unwrap();
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_explicit_reconnect_counts() {
    let (manager, _, metrics) = manager_with(FakeTransport::disconnected());
    manager.reconnect().await.unwrap();
    assert_eq!(metrics.snapshot().mqtt_reconnect_count, 1);
}

#[tokio::test]
async fn test_disconnect_closes_transport() {
    let (manager, transport, _) = manager_with(FakeTransport::connected());
    manager.disconnect().await;
    assert_eq!(transport.disconnect_calls(), 1);
    assert!(!manager.is_connected());
}

#[test]
fn test_publish_error_display() {
    let err = PublishError::Unavailable(BusError::Timeout);
    assert_eq!(err.to_string(), "Broker unavailable: Operation timed out");

    let err = PublishError::Failed(BusError::Other("boom".to_string()));
    assert_eq!(err.to_string(), "Publish failed: boom");
}
