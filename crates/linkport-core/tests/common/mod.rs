//! Shared test utilities: a scripted in-memory radio and event helpers

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use linkport_core::{
    Device, EventReceiver, LinkEvent, Radio, RadioError, RadioEvent, RadioEventSender,
    StreamConnection, TransportType,
};
use tokio::io::DuplexStream;
use tokio::sync::watch;
use tokio::time::timeout;
use uuid::Uuid;

pub const WAIT: Duration = Duration::from_secs(2);

// ----------------------------------------------------------------------------
// Mock Radio
// ----------------------------------------------------------------------------

/// Calls the link manager made on the radio
#[derive(Debug, Clone, PartialEq)]
pub enum RadioCall {
    StartScan(TransportType),
    StopScan(TransportType),
    ConnectStream(String, Uuid),
    ConnectAttribute(String),
    DiscoverServices(String),
    Subscribe(String, Uuid),
    Write(String, Uuid, Vec<u8>),
    DisconnectAttribute(String),
    CloseAttribute(String),
}

struct MockState {
    events: Option<RadioEventSender>,
    calls: Vec<RadioCall>,
    remotes: HashMap<String, DuplexStream>,
    names: HashMap<String, String>,
    stream_failures: usize,
    scanning: HashSet<TransportType>,
    unavailable: HashSet<TransportType>,
}

/// Scripted radio; clones share state so tests keep a handle after build
#[derive(Clone)]
pub struct MockRadio {
    state: Arc<Mutex<MockState>>,
    gate: Arc<watch::Sender<bool>>,
    subscribe_gate: Arc<watch::Sender<bool>>,
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRadio {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        let (subscribe_gate, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(MockState {
                events: None,
                calls: Vec::new(),
                remotes: HashMap::new(),
                names: HashMap::new(),
                stream_failures: 0,
                scanning: HashSet::new(),
                unavailable: HashSet::new(),
            })),
            gate: Arc::new(gate),
            subscribe_gate: Arc::new(subscribe_gate),
        }
    }

    /// Name reported when a stream to `address` opens
    pub fn set_name(&self, address: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .names
            .insert(address.to_string(), name.to_string());
    }

    /// Fail the next `count` stream connects
    pub fn fail_streams(&self, count: usize) {
        self.state.lock().unwrap().stream_failures = count;
    }

    pub fn make_unavailable(&self, transport: TransportType) {
        self.state.lock().unwrap().unavailable.insert(transport);
    }

    /// Park stream connects until [`MockRadio::release_streams`]
    pub fn hold_streams(&self) {
        self.gate.send_replace(true);
    }

    pub fn release_streams(&self) {
        self.gate.send_replace(false);
    }

    /// Park subscribes until [`MockRadio::release_subscribes`]
    pub fn hold_subscribes(&self) {
        self.subscribe_gate.send_replace(true);
    }

    pub fn release_subscribes(&self) {
        self.subscribe_gate.send_replace(false);
    }

    /// Push a hardware callback into the link manager
    pub fn emit(&self, event: RadioEvent) {
        let sender = self.state.lock().unwrap().events.clone();
        sender
            .expect("events not attached")
            .send(event)
            .expect("link manager stopped");
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, matches: impl Fn(&RadioCall) -> bool) -> usize {
        self.calls().iter().filter(|c| matches(c)).count()
    }

    /// Stream and attribute connect attempts to `address`
    pub fn connect_attempts(&self, address: &str) -> usize {
        self.count_calls(|call| match call {
            RadioCall::ConnectStream(a, _) | RadioCall::ConnectAttribute(a) => a == address,
            _ => false,
        })
    }

    /// Peer end of the most recent stream opened to `address`
    pub fn take_remote(&self, address: &str) -> Option<DuplexStream> {
        self.state.lock().unwrap().remotes.remove(address)
    }

    pub async fn wait_for_remote(&self, address: &str) -> DuplexStream {
        eventually(|| self.state.lock().unwrap().remotes.contains_key(address)).await;
        self.take_remote(address).expect("remote end")
    }

    pub async fn wait_for_call(&self, expected: RadioCall) {
        eventually(|| self.calls().contains(&expected)).await;
    }

    fn record(&self, call: RadioCall) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn send_event(&self, event: RadioEvent) {
        if let Some(events) = &self.state.lock().unwrap().events {
            let _ = events.send(event);
        }
    }
}

/// Wait while `gate` is held
async fn parked(gate: &watch::Sender<bool>) {
    let mut gate = gate.subscribe();
    loop {
        let held = *gate.borrow_and_update();
        if !held || gate.changed().await.is_err() {
            break;
        }
    }
}

#[async_trait]
impl Radio for MockRadio {
    fn attach_events(&mut self, events: RadioEventSender) -> Result<(), RadioError> {
        let mut state = self.state.lock().unwrap();
        if state.events.is_some() {
            return Err(RadioError::EventsAlreadyAttached);
        }
        state.events = Some(events);
        Ok(())
    }

    async fn start_scan(&self, transport: TransportType) -> Result<(), RadioError> {
        self.record(RadioCall::StartScan(transport));
        let started = {
            let mut state = self.state.lock().unwrap();
            if state.unavailable.contains(&transport) {
                return Err(RadioError::TransportUnavailable { transport });
            }
            state.scanning.insert(transport)
        };
        if started {
            self.send_event(RadioEvent::ScanStarted { transport });
        }
        Ok(())
    }

    async fn stop_scan(&self, transport: TransportType) -> Result<(), RadioError> {
        self.record(RadioCall::StopScan(transport));
        let stopped = self.state.lock().unwrap().scanning.remove(&transport);
        if stopped {
            self.send_event(RadioEvent::ScanFinished { transport });
        }
        Ok(())
    }

    async fn connect_stream(
        &self,
        address: &str,
        service: Uuid,
    ) -> Result<StreamConnection, RadioError> {
        self.record(RadioCall::ConnectStream(address.to_string(), service));

        parked(&self.gate).await;

        let mut state = self.state.lock().unwrap();
        if state.stream_failures > 0 {
            state.stream_failures -= 1;
            return Err(RadioError::ConnectFailed {
                address: address.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let (local, remote) = tokio::io::duplex(1024);
        state.remotes.insert(address.to_string(), remote);
        let name = state.names.get(address).cloned().unwrap_or_default();
        Ok(StreamConnection::new(name, local))
    }

    async fn connect_attribute(&self, address: &str) -> Result<(), RadioError> {
        self.record(RadioCall::ConnectAttribute(address.to_string()));
        Ok(())
    }

    async fn discover_services(&self, address: &str) -> Result<(), RadioError> {
        self.record(RadioCall::DiscoverServices(address.to_string()));
        Ok(())
    }

    async fn subscribe(&self, address: &str, characteristic: Uuid) -> Result<(), RadioError> {
        self.record(RadioCall::Subscribe(address.to_string(), characteristic));
        parked(&self.subscribe_gate).await;
        Ok(())
    }

    async fn write_characteristic(
        &self,
        address: &str,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), RadioError> {
        self.record(RadioCall::Write(
            address.to_string(),
            characteristic,
            value.to_vec(),
        ));
        self.send_event(RadioEvent::CharacteristicWritten {
            address: address.to_string(),
            success: true,
        });
        Ok(())
    }

    async fn disconnect_attribute(&self, address: &str) -> Result<(), RadioError> {
        self.record(RadioCall::DisconnectAttribute(address.to_string()));
        Ok(())
    }

    async fn close_attribute(&self, address: &str) -> Result<(), RadioError> {
        self.record(RadioCall::CloseAttribute(address.to_string()));
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Event Helpers
// ----------------------------------------------------------------------------

/// Wait for the next event matching `predicate`, skipping others
pub async fn wait_for_event(
    events: &mut EventReceiver,
    predicate: impl Fn(&LinkEvent) -> bool,
) -> LinkEvent {
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event bus closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Wait for the next `ConnectionChanged` and return its payload
pub async fn next_connection_change(events: &mut EventReceiver) -> (bool, Option<Device>) {
    match wait_for_event(events, |e| matches!(e, LinkEvent::ConnectionChanged { .. })).await {
        LinkEvent::ConnectionChanged { connected, device } => (connected, device),
        _ => unreachable!(),
    }
}

/// Everything already delivered to `events`
pub fn drain(events: &mut EventReceiver) -> Vec<LinkEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Let spawned tasks and the callback pump run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Poll `condition` until it holds
pub async fn eventually(condition: impl Fn() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub fn attribute_device(address: &str, name: &str) -> Device {
    Device::new(name, address, TransportType::AttributeBased)
}
