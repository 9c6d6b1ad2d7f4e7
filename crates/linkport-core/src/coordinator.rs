//! Connection lifecycle state machine
//!
//! The coordinator drives connect and disconnect attempts against the single
//! current-connection slot, translates hardware callbacks into state
//! transitions and publishes every transition on the event bus.
//!
//! ```text
//!   Idle --connect--> Connecting --success--> Connected --disconnect--> Disconnecting --> Idle
//!                         |                       |
//!                         +--failure--> Idle      +--remote teardown--> Idle
//! ```
//!
//! All state lives behind one lock. The connect gate is a check-and-set on
//! the phase under that lock, so two callers racing on `connect()` can never
//! both leave `Idle`. Each attempt carries a sequence number; results for an
//! attempt that is no longer current are discarded and their handles
//! released.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec;
use crate::config::LinkConfig;
use crate::device::{Device, LastDevice, TransportType};
use crate::error::{LinkError, LinkResult, RadioError};
use crate::events::{EventBus, LinkEvent, Notice};
use crate::radio::{BoxedLinkStream, Radio, RadioEvent, RadioEventSender, StreamConnection};
use crate::registry::ConnectionRegistry;
use crate::session::{ReceiveHook, TransportSession};
use crate::storage::DeviceStore;

// ----------------------------------------------------------------------------
// Phase and Status
// ----------------------------------------------------------------------------

/// Coordinator state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkPhase {
    Idle,
    Connecting {
        address: String,
        transport: TransportType,
    },
    Connected,
    Disconnecting,
}

impl LinkPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, LinkPhase::Idle)
    }
}

/// Who asked for a connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectOrigin {
    User,
    AutoConnect,
    Reconnect,
}

/// Point-in-time view of the link
#[derive(Debug, Clone, PartialEq)]
pub struct LinkStatus {
    pub phase: LinkPhase,
    pub device: Option<Device>,
    pub connected: bool,
    pub last_attempted_address: Option<String>,
    pub auto_connect_armed: bool,
}

struct LinkState {
    phase: LinkPhase,
    attempt: u64,
    registry: ConnectionRegistry,
}

impl LinkState {
    fn is_current_attempt(&self, attempt: u64) -> bool {
        matches!(self.phase, LinkPhase::Connecting { .. }) && self.attempt == attempt
    }

    fn is_connecting_to(&self, address: &str, transport: TransportType) -> bool {
        matches!(
            &self.phase,
            LinkPhase::Connecting { address: a, transport: t } if a == address && *t == transport
        )
    }
}

// ----------------------------------------------------------------------------
// Connection Coordinator
// ----------------------------------------------------------------------------

struct CoordinatorInner {
    state: Mutex<LinkState>,
    radio: Arc<dyn Radio>,
    store: Arc<dyn DeviceStore>,
    events: EventBus,
    config: LinkConfig,
    /// Feeds `StreamClosed` from legacy read tasks back into the event pump
    signals: RadioEventSender,
}

/// Drives the connection lifecycle; clones share the same state
#[derive(Clone)]
pub struct ConnectionCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl ConnectionCoordinator {
    pub(crate) fn new(
        radio: Arc<dyn Radio>,
        store: Arc<dyn DeviceStore>,
        events: EventBus,
        config: LinkConfig,
        signals: RadioEventSender,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                state: Mutex::new(LinkState {
                    phase: LinkPhase::Idle,
                    attempt: 0,
                    registry: ConnectionRegistry::new(),
                }),
                radio,
                store,
                events,
                config,
                signals,
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn phase(&self) -> LinkPhase {
        self.inner.state.lock().await.phase.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.state.lock().await.registry.is_connected()
    }

    pub async fn connected_device(&self) -> Option<Device> {
        let state = self.inner.state.lock().await;
        let (device, connected) = state.registry.current();
        device.filter(|_| connected).cloned()
    }

    pub async fn characteristics(&self) -> Vec<Uuid> {
        self.inner.state.lock().await.registry.characteristics().to_vec()
    }

    pub async fn status(&self) -> LinkStatus {
        let state = self.inner.state.lock().await;
        let (device, connected) = state.registry.current();
        LinkStatus {
            phase: state.phase.clone(),
            device: device.cloned(),
            connected,
            last_attempted_address: state.registry.last_attempted_address().map(String::from),
            auto_connect_armed: state.registry.auto_connect_armed(),
        }
    }

    pub(crate) async fn arm_auto_connect(&self) {
        self.inner.state.lock().await.registry.arm_auto_connect();
    }

    // ------------------------------------------------------------------------
    // Connect
    // ------------------------------------------------------------------------

    /// Start connecting to `address`
    ///
    /// Returns once the attempt is admitted; the outcome is published as a
    /// `ConnectionChanged` event. Rejected with `AlreadyConnected` (and a
    /// `DisconnectFirst` notice) unless the coordinator is idle.
    pub async fn connect(&self, address: &str, transport: TransportType) -> LinkResult<()> {
        self.begin_connect(address, transport, ConnectOrigin::User)
            .await
    }

    pub(crate) async fn begin_connect(
        &self,
        address: &str,
        transport: TransportType,
        origin: ConnectOrigin,
    ) -> LinkResult<()> {
        let attempt = {
            let mut state = self.inner.state.lock().await;
            let phase = state.phase.clone();
            let rejection = match phase {
                LinkPhase::Idle => None,
                LinkPhase::Connected => Some(LinkError::AlreadyConnected {
                    address: state
                        .registry
                        .connected_device()
                        .map(|d| d.address.clone())
                        .unwrap_or_default(),
                }),
                LinkPhase::Connecting { address, .. } => {
                    Some(LinkError::ConnectInProgress { address })
                }
                LinkPhase::Disconnecting => Some(LinkError::Disconnecting),
            };

            if let Some(err) = rejection {
                if origin != ConnectOrigin::Reconnect {
                    self.inner.events.notify(Notice::DisconnectFirst);
                }
                debug!("Connect to {} rejected: {}", address, err);
                return Err(err);
            }

            state.attempt += 1;
            state.phase = LinkPhase::Connecting {
                address: address.to_string(),
                transport,
            };
            state.registry.record_attempt(address);
            state.attempt
        };

        info!(
            "Connecting to {} via {} transport ({:?})",
            address, transport, origin
        );

        // The attempt runs detached so neither the caller nor a cancelled
        // reconnect tick can strand the coordinator in `Connecting`.
        let coordinator = self.clone();
        let address = address.to_string();
        tokio::spawn(async move {
            match transport {
                TransportType::Legacy => coordinator.attempt_legacy(attempt, address).await,
                TransportType::AttributeBased => {
                    coordinator.attempt_attribute(attempt, address).await
                }
            }
        });

        Ok(())
    }

    async fn attempt_legacy(&self, attempt: u64, address: String) {
        let service = self.inner.config.legacy_service_uuid;
        let connecting = self.inner.radio.connect_stream(&address, service);

        let result = match self.inner.config.connect_timeout() {
            Some(limit) => tokio::time::timeout(limit, connecting)
                .await
                .unwrap_or_else(|_| {
                    Err(RadioError::ConnectFailed {
                        address: address.clone(),
                        reason: format!("timed out after {}ms", limit.as_millis()),
                    })
                }),
            None => connecting.await,
        };

        match result {
            Ok(connection) => self.complete_legacy(attempt, address, connection).await,
            Err(e) => {
                self.fail_attempt(attempt, &address, &e.to_string()).await;
            }
        }
    }

    async fn complete_legacy(&self, attempt: u64, address: String, connection: StreamConnection) {
        let mut state = self.inner.state.lock().await;
        if !state.is_current_attempt(attempt) {
            drop(state);
            warn!("Discarding stream to {}: attempt no longer current", address);
            release_stream(&address, connection.stream).await;
            return;
        }

        let device = Device::new(connection.name, address, TransportType::Legacy);
        let session = TransportSession::legacy(
            device.clone(),
            connection.stream,
            self.receive_hook(&device),
            self.inner.signals.clone(),
        );
        self.establish(&mut state, device, session).await;
    }

    async fn attempt_attribute(&self, attempt: u64, address: String) {
        if let Err(e) = self.inner.radio.connect_attribute(&address).await {
            if self.fail_attempt(attempt, &address, &e.to_string()).await {
                self.release_attribute_handle(&address, false).await;
            }
            return;
        }

        // The outcome arrives as a hardware callback; only the optional
        // timeout is tracked here.
        if let Some(limit) = self.inner.config.connect_timeout() {
            tokio::time::sleep(limit).await;
            let reason = format!("timed out after {}ms", limit.as_millis());
            if self.fail_attempt(attempt, &address, &reason).await {
                self.release_attribute_handle(&address, true).await;
            }
        }
    }

    /// Move `state` to `Connected` with `session` as the active session
    async fn establish(&self, state: &mut LinkState, device: Device, session: TransportSession) {
        if let Some(mut previous) = state.registry.set_connected(device.clone(), session) {
            warn!("Releasing superseded session to {}", previous.device());
            previous.close().await;
        }
        state.phase = LinkPhase::Connected;

        if let Err(e) = self
            .inner
            .store
            .save_last_device(&LastDevice::from(&device))
        {
            warn!("Failed to persist last device {}: {}", device.address, e);
        }

        info!("Connected to {} via {} transport", device, device.transport);
        self.inner.events.emit(LinkEvent::ConnectionChanged {
            connected: true,
            device: Some(device),
        });
        self.inner.events.notify(Notice::ConnectSucceeded);
    }

    /// Fail `attempt` if it is still current; returns whether it was
    async fn fail_attempt(&self, attempt: u64, address: &str, reason: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        if !state.is_current_attempt(attempt) {
            debug!("Ignoring failure of stale attempt to {}: {}", address, reason);
            return false;
        }

        state.phase = LinkPhase::Idle;
        warn!("Connect to {} failed: {}", address, reason);
        self.inner.events.emit(LinkEvent::ConnectionChanged {
            connected: false,
            device: None,
        });
        self.inner.events.notify(Notice::ConnectFailed);
        true
    }

    // ------------------------------------------------------------------------
    // Disconnect and Send
    // ------------------------------------------------------------------------

    /// Close the active session
    ///
    /// A no-op when idle or already disconnecting, so racing a remote
    /// teardown produces a single notification. While connecting, the
    /// pending attempt is abandoned and its result discarded.
    pub async fn disconnect(&self) -> LinkResult<()> {
        let (device, mut session) = {
            let mut state = self.inner.state.lock().await;
            let phase = state.phase.clone();
            match phase {
                LinkPhase::Idle | LinkPhase::Disconnecting => {
                    debug!("Disconnect requested with no active session");
                    return Ok(());
                }
                LinkPhase::Connecting { address, transport } => {
                    state.phase = LinkPhase::Idle;
                    info!("Abandoning connect attempt to {}", address);
                    self.inner.events.emit(LinkEvent::ConnectionChanged {
                        connected: false,
                        device: None,
                    });
                    drop(state);
                    if transport == TransportType::AttributeBased {
                        self.release_attribute_handle(&address, true).await;
                    }
                    return Ok(());
                }
                LinkPhase::Connected => {}
            }

            match state.registry.set_disconnected() {
                Some(held) => {
                    state.phase = LinkPhase::Disconnecting;
                    held
                }
                None => {
                    state.phase = LinkPhase::Idle;
                    return Ok(());
                }
            }
        };

        session.close().await;

        let mut state = self.inner.state.lock().await;
        state.phase = LinkPhase::Idle;
        info!("Disconnected from {}", device);
        self.inner.events.emit(LinkEvent::ConnectionChanged {
            connected: false,
            device: Some(device),
        });
        self.inner.events.notify(Notice::Disconnected);
        Ok(())
    }

    /// Send a payload over the active session
    pub async fn send(&self, payload: &[u8]) -> LinkResult<()> {
        let writer = {
            let state = self.inner.state.lock().await;
            match state.registry.session() {
                Some(session) if state.registry.is_connected() => session.writer()?,
                _ => return Err(LinkError::NotConnected),
            }
        };
        writer.send(payload).await
    }

    // ------------------------------------------------------------------------
    // Hardware Callbacks
    // ------------------------------------------------------------------------

    /// Apply a connection-related hardware callback
    pub(crate) async fn handle_radio_event(&self, event: RadioEvent) {
        match event {
            RadioEvent::AttributeConnected { address, name } => {
                self.on_attribute_connected(address, name).await
            }
            RadioEvent::AttributeDisconnected { address } => {
                self.on_attribute_disconnected(address).await
            }
            RadioEvent::ServicesDiscovered {
                address,
                characteristics,
            } => self.on_services_discovered(address, characteristics).await,
            RadioEvent::CharacteristicChanged {
                address,
                characteristic,
                value,
            } => self.on_characteristic_changed(address, characteristic, value).await,
            RadioEvent::CharacteristicWritten { address, success } => {
                if success {
                    debug!("Write to {} acknowledged", address);
                } else {
                    warn!("Write to {} reported failure", address);
                }
            }
            RadioEvent::StreamClosed { address } => self.on_stream_closed(address).await,
            RadioEvent::DeviceFound { .. }
            | RadioEvent::ScanStarted { .. }
            | RadioEvent::ScanFinished { .. } => {
                debug!("Discovery event routed to coordinator, ignoring");
            }
        }
    }

    async fn on_attribute_connected(&self, address: String, name: String) {
        let mut state = self.inner.state.lock().await;
        if state.registry.holds(&address, TransportType::AttributeBased) {
            debug!("Duplicate connect callback for {}", address);
            return;
        }
        if !state.is_connecting_to(&address, TransportType::AttributeBased) {
            drop(state);
            warn!("Unexpected attribute connection to {}, releasing it", address);
            self.release_attribute_handle(&address, true).await;
            return;
        }

        let device = Device::new(name, address.clone(), TransportType::AttributeBased);
        let session = TransportSession::attribute(
            device.clone(),
            self.inner.radio.clone(),
            self.inner.config.attribute_characteristic_uuid,
            self.receive_hook(&device),
        );
        self.establish(&mut state, device, session).await;
        drop(state);

        // Data flow is usable only after the characteristic subscription
        if let Err(e) = self.inner.radio.discover_services(&address).await {
            warn!("Service discovery on {} failed: {}", address, e);
        }
    }

    async fn on_attribute_disconnected(&self, address: String) {
        let mut state = self.inner.state.lock().await;

        if state.registry.holds(&address, TransportType::AttributeBased) {
            self.teardown_remote(&mut state).await;
        } else if state.is_connecting_to(&address, TransportType::AttributeBased) {
            // The connect itself failed
            state.phase = LinkPhase::Idle;
            warn!("Attribute connect to {} failed", address);
            self.inner.events.emit(LinkEvent::ConnectionChanged {
                connected: false,
                device: None,
            });
            self.inner.events.notify(Notice::ConnectFailed);
            drop(state);
            self.release_attribute_handle(&address, false).await;
        } else {
            debug!("Ignoring disconnect from {}: no active session", address);
        }
    }

    async fn on_stream_closed(&self, address: String) {
        let mut state = self.inner.state.lock().await;
        if state.registry.holds(&address, TransportType::Legacy) {
            self.teardown_remote(&mut state).await;
        } else {
            debug!("Ignoring closed stream from {}: no active session", address);
        }
    }

    /// Tear down after the peer dropped the connection
    async fn teardown_remote(&self, state: &mut LinkState) {
        let Some((device, mut session)) = state.registry.set_disconnected() else {
            state.phase = LinkPhase::Idle;
            return;
        };

        session.mark_remote_closed();
        session.close().await;
        state.phase = LinkPhase::Idle;

        info!("Connection to {} lost", device);
        self.inner.events.emit(LinkEvent::ConnectionChanged {
            connected: false,
            device: Some(device),
        });
        self.inner.events.notify(Notice::Disconnected);
    }

    async fn on_services_discovered(&self, address: String, characteristics: Vec<Uuid>) {
        let mut state = self.inner.state.lock().await;
        if !state.registry.holds(&address, TransportType::AttributeBased) {
            debug!("Ignoring services of {}: no active session", address);
            return;
        }

        let target = self.inner.config.attribute_characteristic_uuid;
        let found = characteristics.contains(&target);
        debug!("{} offers {} characteristics", address, characteristics.len());
        state.registry.set_characteristics(characteristics);

        if !found {
            warn!("Characteristic {} not offered by {}", target, address);
            return;
        }
        if let Some(session) = state.registry.session_mut() {
            session.mark_characteristic_found();
        }
        drop(state);

        // Subscribing is a hardware round trip; the lock is not held across it
        if let Err(e) = self.inner.radio.subscribe(&address, target).await {
            warn!("Failed to subscribe to {} on {}: {}", target, address, e);
            return;
        }

        let mut state = self.inner.state.lock().await;
        if !state.registry.holds(&address, TransportType::AttributeBased) {
            debug!("Session to {} ended while subscribing", address);
            return;
        }
        if let Some(session) = state.registry.session_mut() {
            session.mark_subscribed();
        }
        info!("Subscribed to {} on {}", target, address);
    }

    async fn on_characteristic_changed(&self, address: String, characteristic: Uuid, value: Vec<u8>) {
        let state = self.inner.state.lock().await;
        if characteristic != self.inner.config.attribute_characteristic_uuid
            || !state.registry.holds(&address, TransportType::AttributeBased)
        {
            debug!("Ignoring notification from {} on {}", address, characteristic);
            return;
        }
        if let Some(session) = state.registry.session() {
            session.on_receive(value);
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn receive_hook(&self, device: &Device) -> ReceiveHook {
        let events = self.inner.events.clone();
        let format = self.inner.config.read_format;
        let device = device.clone();

        Arc::new(move |payload: Vec<u8>| {
            let text = codec::render_incoming(&payload, format);
            debug!("Received {} bytes from {}", payload.len(), device.address);
            events.emit(LinkEvent::DataReceived {
                device: device.clone(),
                payload,
                text,
            });
        })
    }

    async fn release_attribute_handle(&self, address: &str, disconnect: bool) {
        if disconnect {
            if let Err(e) = self.inner.radio.disconnect_attribute(address).await {
                warn!("Failed to disconnect {}: {}", address, e);
            }
        }
        if let Err(e) = self.inner.radio.close_attribute(address).await {
            warn!("Failed to release attribute handle for {}: {}", address, e);
        }
    }
}

async fn release_stream(address: &str, mut stream: BoxedLinkStream) {
    if let Err(e) = stream.shutdown().await {
        warn!("Failed to close stream to {}: {}", address, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(phase: LinkPhase, attempt: u64) -> LinkState {
        LinkState {
            phase,
            attempt,
            registry: ConnectionRegistry::new(),
        }
    }

    #[test]
    fn attempt_is_current_only_while_connecting() {
        let connecting = state(
            LinkPhase::Connecting {
                address: "AA:BB".into(),
                transport: TransportType::Legacy,
            },
            3,
        );
        assert!(connecting.is_current_attempt(3));
        assert!(!connecting.is_current_attempt(2));
        assert!(connecting.is_connecting_to("AA:BB", TransportType::Legacy));
        assert!(!connecting.is_connecting_to("AA:BB", TransportType::AttributeBased));

        let idle = state(LinkPhase::Idle, 3);
        assert!(!idle.is_current_attempt(3));
        assert!(idle.phase.is_idle());
    }
}
