//! Reconnect timer behaviour under paused time

mod common;

use std::time::Duration;

use common::*;
use linkport_core::{
    LastDevice, LinkManager, MemoryDeviceStore, ReconnectOutcome, ReconnectPolicy, TransportType,
};

fn stored(address: &str) -> MemoryDeviceStore {
    MemoryDeviceStore::with_device(LastDevice::new(address, TransportType::Legacy))
}

async fn reconnecting_manager(radio: &MockRadio, store: MemoryDeviceStore) -> LinkManager {
    LinkManager::builder()
        .reconnect(ReconnectPolicy::every(1_000))
        .build(radio.clone(), store)
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_one_attempt_per_tick() {
    let radio = MockRadio::new();
    radio.fail_streams(usize::MAX);
    let _manager = reconnecting_manager(&radio, stored("AA:BB")).await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(radio.connect_attempts("AA:BB"), 0);

    // Ticks at 1s, 2s and 3s
    tokio::time::sleep(Duration::from_millis(3_000)).await;
    assert_eq!(radio.connect_attempts("AA:BB"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_no_attempts_while_connecting() {
    let radio = MockRadio::new();
    radio.hold_streams();
    let manager = reconnecting_manager(&radio, stored("AA:BB")).await;
    let mut events = manager.subscribe();

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(radio.connect_attempts("AA:BB"), 1);

    // The first attempt is still pending across several ticks
    tokio::time::sleep(Duration::from_millis(5_000)).await;
    assert_eq!(radio.connect_attempts("AA:BB"), 1);

    radio.release_streams();
    assert!(next_connection_change(&mut events).await.0);

    // Connected: ticks are no-ops
    tokio::time::sleep(Duration::from_millis(5_000)).await;
    assert_eq!(radio.connect_attempts("AA:BB"), 1);
    assert!(manager.is_connected().await);
}

#[tokio::test(start_paused = true)]
async fn test_disabling_cancels_pending_ticks_only() {
    let radio = MockRadio::new();
    radio.hold_streams();
    let manager = reconnecting_manager(&radio, stored("AA:BB")).await;
    let mut events = manager.subscribe();
    assert!(manager.is_reconnect_armed());

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(radio.connect_attempts("AA:BB"), 1);

    manager
        .set_reconnect_policy(ReconnectPolicy::disabled())
        .unwrap();
    assert!(!manager.is_reconnect_armed());

    // The in-flight attempt still completes
    radio.release_streams();
    assert!(next_connection_change(&mut events).await.0);

    manager.disconnect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(5_000)).await;
    assert_eq!(radio.connect_attempts("AA:BB"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rearming_replaces_timer() {
    let radio = MockRadio::new();
    radio.fail_streams(usize::MAX);
    let manager = reconnecting_manager(&radio, stored("AA:BB")).await;

    tokio::time::sleep(Duration::from_millis(900)).await;
    manager
        .set_reconnect_policy(ReconnectPolicy::every(1_000))
        .unwrap();
    manager
        .set_reconnect_policy(ReconnectPolicy::every(1_000))
        .unwrap();

    // The first 1s tick was replaced; the new timer fires at 1.9s
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(radio.connect_attempts("AA:BB"), 0);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(radio.connect_attempts("AA:BB"), 1);

    assert!(manager
        .set_reconnect_policy(ReconnectPolicy::every(0))
        .is_err());
}

#[tokio::test]
async fn test_reconnect_now_outcomes() {
    let radio = MockRadio::new();
    let store = MemoryDeviceStore::new();
    let manager = LinkManager::builder()
        .build(radio.clone(), store.clone())
        .await
        .unwrap();

    assert_eq!(manager.reconnect_now().await, ReconnectOutcome::Disabled);

    manager
        .set_reconnect_policy(ReconnectPolicy::every(60_000))
        .unwrap();
    assert_eq!(manager.reconnect_now().await, ReconnectOutcome::NoLastDevice);

    let mut events = manager.subscribe();
    manager.connect("AA:BB", TransportType::Legacy).await.unwrap();
    assert!(next_connection_change(&mut events).await.0);
    assert_eq!(manager.reconnect_now().await, ReconnectOutcome::Busy);

    manager.disconnect().await.unwrap();
    assert!(!next_connection_change(&mut events).await.0);
    assert_eq!(
        manager.reconnect_now().await,
        ReconnectOutcome::Attempted(LastDevice::new("AA:BB", TransportType::Legacy))
    );
    assert!(next_connection_change(&mut events).await.0);
    assert_eq!(radio.connect_attempts("AA:BB"), 2);
}

#[tokio::test]
async fn test_first_attempt_waits_for_subscriber() {
    let radio = MockRadio::new();
    let manager = LinkManager::builder()
        .reconnect(ReconnectPolicy::every(60_000))
        .build(radio.clone(), stored("AA:BB"))
        .await
        .unwrap();
    settle().await;
    assert_eq!(radio.connect_attempts("AA:BB"), 0);

    // Subscribe first, then start the attempt: its outcome is never missed
    let mut events = manager.subscribe();
    assert_eq!(
        manager.reconnect_now().await,
        ReconnectOutcome::Attempted(LastDevice::new("AA:BB", TransportType::Legacy))
    );
    let (connected, device) = next_connection_change(&mut events).await;
    assert!(connected);
    assert_eq!(device.map(|d| d.address), Some("AA:BB".to_string()));
}
