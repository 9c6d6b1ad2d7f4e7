//! Attribute transport flows driven by hardware callbacks

mod common;

use common::*;
use linkport_core::{
    LinkError, LinkEvent, LinkManager, LinkPhase, MemoryDeviceStore, Notice, RadioEvent,
    TransportType, DEFAULT_ATTRIBUTE_CHARACTERISTIC_UUID,
};
use std::time::Duration;

use tokio::time::timeout;
use uuid::Uuid;

const PEER: &str = "11:22:33:44:55:66";

async fn connected_manager(radio: &MockRadio) -> (LinkManager, linkport_core::EventReceiver) {
    let manager = LinkManager::builder()
        .build(radio.clone(), MemoryDeviceStore::new())
        .await
        .unwrap();
    let mut events = manager.subscribe();

    manager
        .connect(PEER, TransportType::AttributeBased)
        .await
        .unwrap();
    radio
        .wait_for_call(RadioCall::ConnectAttribute(PEER.into()))
        .await;
    radio.emit(RadioEvent::AttributeConnected {
        address: PEER.into(),
        name: "BT05".into(),
    });

    let (connected, device) = next_connection_change(&mut events).await;
    assert!(connected);
    assert_eq!(device, Some(attribute_device(PEER, "BT05")));
    (manager, events)
}

fn services_discovered(characteristics: Vec<Uuid>) -> RadioEvent {
    RadioEvent::ServicesDiscovered {
        address: PEER.into(),
        characteristics,
    }
}

fn notification(characteristic: Uuid, value: &[u8]) -> RadioEvent {
    RadioEvent::CharacteristicChanged {
        address: PEER.into(),
        characteristic,
        value: value.to_vec(),
    }
}

#[tokio::test]
async fn test_connect_discovers_and_subscribes() {
    let radio = MockRadio::new();
    let (manager, mut events) = connected_manager(&radio).await;

    radio
        .wait_for_call(RadioCall::DiscoverServices(PEER.into()))
        .await;

    let other = Uuid::from_u128(0x2A00);
    radio.emit(services_discovered(vec![
        other,
        DEFAULT_ATTRIBUTE_CHARACTERISTIC_UUID,
    ]));
    radio
        .wait_for_call(RadioCall::Subscribe(
            PEER.into(),
            DEFAULT_ATTRIBUTE_CHARACTERISTIC_UUID,
        ))
        .await;
    assert_eq!(
        manager.characteristics().await,
        vec![other, DEFAULT_ATTRIBUTE_CHARACTERISTIC_UUID]
    );

    radio.emit(notification(DEFAULT_ATTRIBUTE_CHARACTERISTIC_UUID, b"hi"));
    let received =
        wait_for_event(&mut events, |e| matches!(e, LinkEvent::DataReceived { .. })).await;
    assert!(matches!(
        received,
        LinkEvent::DataReceived { ref payload, ref text, .. } if payload == b"hi" && text == "hi"
    ));

    manager.send(b"ping").await.unwrap();
    assert!(radio.calls().contains(&RadioCall::Write(
        PEER.into(),
        DEFAULT_ATTRIBUTE_CHARACTERISTIC_UUID,
        b"ping".to_vec()
    )));
}

#[tokio::test]
async fn test_notifications_before_subscription_are_dropped() {
    let radio = MockRadio::new();
    let (_manager, mut events) = connected_manager(&radio).await;

    radio.emit(notification(DEFAULT_ATTRIBUTE_CHARACTERISTIC_UUID, b"early"));
    radio.emit(services_discovered(vec![DEFAULT_ATTRIBUTE_CHARACTERISTIC_UUID]));
    radio
        .wait_for_call(RadioCall::Subscribe(
            PEER.into(),
            DEFAULT_ATTRIBUTE_CHARACTERISTIC_UUID,
        ))
        .await;
    radio.emit(notification(Uuid::from_u128(0x2A00), b"other"));
    radio.emit(notification(DEFAULT_ATTRIBUTE_CHARACTERISTIC_UUID, b"late"));

    let received =
        wait_for_event(&mut events, |e| matches!(e, LinkEvent::DataReceived { .. })).await;
    assert!(matches!(
        received,
        LinkEvent::DataReceived { ref payload, .. } if payload == b"late"
    ));
}

#[tokio::test]
async fn test_send_before_characteristic_found_fails() {
    let radio = MockRadio::new();
    let (manager, _events) = connected_manager(&radio).await;

    assert!(matches!(
        manager.send(b"ping").await,
        Err(LinkError::SendFailed(_))
    ));

    // Discovery without the serial characteristic leaves writes refused
    radio.emit(services_discovered(vec![Uuid::from_u128(0x2A00)]));
    eventually(|| radio.count_calls(|c| matches!(c, RadioCall::DiscoverServices(_))) == 1).await;
    settle().await;
    assert!(manager.send(b"ping").await.is_err());
    assert_eq!(
        radio.count_calls(|c| matches!(c, RadioCall::Subscribe(..))),
        0
    );
}

#[tokio::test]
async fn test_failed_attribute_connect_is_not_a_disconnect() {
    let radio = MockRadio::new();
    let manager = LinkManager::builder()
        .build(radio.clone(), MemoryDeviceStore::new())
        .await
        .unwrap();
    let mut events = manager.subscribe();

    manager
        .connect(PEER, TransportType::AttributeBased)
        .await
        .unwrap();
    radio
        .wait_for_call(RadioCall::ConnectAttribute(PEER.into()))
        .await;

    // Disconnect callback with no active session: the connect failed
    radio.emit(RadioEvent::AttributeDisconnected {
        address: PEER.into(),
    });
    assert_eq!(next_connection_change(&mut events).await, (false, None));
    assert_eq!(
        wait_for_event(&mut events, |e| matches!(e, LinkEvent::Notice(_))).await,
        LinkEvent::Notice(Notice::ConnectFailed)
    );
    radio
        .wait_for_call(RadioCall::CloseAttribute(PEER.into()))
        .await;
    assert_eq!(manager.status().await.phase, LinkPhase::Idle);
}

#[tokio::test]
async fn test_remote_disconnect_releases_handle_once() {
    let radio = MockRadio::new();
    let (manager, mut events) = connected_manager(&radio).await;

    radio.emit(RadioEvent::AttributeDisconnected {
        address: PEER.into(),
    });
    assert_eq!(
        next_connection_change(&mut events).await,
        (false, Some(attribute_device(PEER, "BT05")))
    );
    assert_eq!(
        wait_for_event(&mut events, |e| matches!(
            e,
            LinkEvent::Notice(Notice::Disconnected)
        ))
        .await,
        LinkEvent::Notice(Notice::Disconnected)
    );

    // A late duplicate and a local disconnect are both no-ops
    radio.emit(RadioEvent::AttributeDisconnected {
        address: PEER.into(),
    });
    manager.disconnect().await.unwrap();
    settle().await;

    assert!(drain(&mut events)
        .iter()
        .all(|e| !matches!(e, LinkEvent::ConnectionChanged { .. })));
    assert_eq!(
        radio.count_calls(|c| matches!(c, RadioCall::CloseAttribute(_))),
        1
    );
    assert_eq!(
        radio.count_calls(|c| matches!(c, RadioCall::DisconnectAttribute(_))),
        0
    );
}

#[tokio::test]
async fn test_local_disconnect_requests_hardware_disconnect() {
    let radio = MockRadio::new();
    let (manager, mut events) = connected_manager(&radio).await;

    manager.disconnect().await.unwrap();
    assert_eq!(
        next_connection_change(&mut events).await,
        (false, Some(attribute_device(PEER, "BT05")))
    );
    assert!(radio
        .calls()
        .contains(&RadioCall::DisconnectAttribute(PEER.into())));
    assert!(radio.calls().contains(&RadioCall::CloseAttribute(PEER.into())));

    // The hardware confirms the disconnect afterwards; nothing more is reported
    radio.emit(RadioEvent::AttributeDisconnected {
        address: PEER.into(),
    });
    settle().await;
    assert!(drain(&mut events)
        .iter()
        .all(|e| !matches!(e, LinkEvent::ConnectionChanged { .. })));
}

#[tokio::test]
async fn test_unexpected_connection_is_released() {
    let radio = MockRadio::new();
    let manager = LinkManager::builder()
        .build(radio.clone(), MemoryDeviceStore::new())
        .await
        .unwrap();

    radio.emit(RadioEvent::AttributeConnected {
        address: PEER.into(),
        name: "BT05".into(),
    });
    radio
        .wait_for_call(RadioCall::CloseAttribute(PEER.into()))
        .await;
    assert!(!manager.is_connected().await);
}

#[tokio::test]
async fn test_connect_timeout_releases_pending_handle() {
    let radio = MockRadio::new();
    let manager = LinkManager::builder()
        .connect_timeout(Some(Duration::from_millis(100)))
        .build(radio.clone(), MemoryDeviceStore::new())
        .await
        .unwrap();
    let mut events = manager.subscribe();

    manager
        .connect(PEER, TransportType::AttributeBased)
        .await
        .unwrap();
    assert_eq!(next_connection_change(&mut events).await, (false, None));
    assert_eq!(
        wait_for_event(&mut events, |e| matches!(e, LinkEvent::Notice(_))).await,
        LinkEvent::Notice(Notice::ConnectFailed)
    );
    radio
        .wait_for_call(RadioCall::DisconnectAttribute(PEER.into()))
        .await;
    radio
        .wait_for_call(RadioCall::CloseAttribute(PEER.into()))
        .await;
    assert_eq!(manager.status().await.phase, LinkPhase::Idle);

    // The hardware finishes the connect after the attempt was given up
    radio.emit(RadioEvent::AttributeConnected {
        address: PEER.into(),
        name: "BT05".into(),
    });
    eventually(|| {
        radio.count_calls(|c| matches!(c, RadioCall::CloseAttribute(a) if a == PEER)) == 2
    })
    .await;
    assert!(!manager.is_connected().await);
    assert!(drain(&mut events)
        .iter()
        .all(|e| !matches!(e, LinkEvent::ConnectionChanged { .. })));
}

#[tokio::test]
async fn test_slow_subscribe_does_not_block_the_manager() {
    let radio = MockRadio::new();
    let (manager, mut events) = connected_manager(&radio).await;

    radio.hold_subscribes();
    radio.emit(services_discovered(vec![DEFAULT_ATTRIBUTE_CHARACTERISTIC_UUID]));
    radio
        .wait_for_call(RadioCall::Subscribe(
            PEER.into(),
            DEFAULT_ATTRIBUTE_CHARACTERISTIC_UUID,
        ))
        .await;

    // Queries, writes and disconnect all proceed while the subscribe is parked
    let status = timeout(WAIT, manager.status()).await.unwrap();
    assert!(status.connected);
    timeout(WAIT, manager.send(b"ping")).await.unwrap().unwrap();
    timeout(WAIT, manager.disconnect()).await.unwrap().unwrap();
    assert_eq!(
        next_connection_change(&mut events).await,
        (false, Some(attribute_device(PEER, "BT05")))
    );

    // The subscribe completing late does not revive the session
    radio.release_subscribes();
    radio.emit(notification(DEFAULT_ATTRIBUTE_CHARACTERISTIC_UUID, b"late"));
    settle().await;
    assert!(!manager.is_connected().await);
    assert_eq!(manager.status().await.phase, LinkPhase::Idle);
    assert!(drain(&mut events)
        .iter()
        .all(|e| !matches!(e, LinkEvent::DataReceived { .. })));
}
