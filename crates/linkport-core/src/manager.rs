//! Link manager facade and builder
//!
//! [`LinkManagerBuilder`] is the configuration surface. Building a manager
//! attaches the radio's callback channel, starts the task that dispatches
//! hardware callbacks to the coordinator and the discovery aggregator, arms
//! the reconnect timer and optionally connects to the stored last device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec;
use crate::config::{LinkConfig, PayloadFormat, ReconnectPolicy};
use crate::coordinator::{ConnectOrigin, ConnectionCoordinator, LinkStatus};
use crate::device::{Device, LastDevice, TransportType};
use crate::discovery::DiscoveryAggregator;
use crate::error::{LinkError, LinkResult};
use crate::events::{EventBus, EventReceiver};
use crate::radio::{radio_event_channel, Radio, RadioEvent, RadioEventReceiver};
use crate::reconnect::{ReconnectOutcome, ReconnectScheduler};
use crate::storage::DeviceStore;

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

/// Builder for [`LinkManager`]
#[derive(Debug, Clone, Default)]
pub struct LinkManagerBuilder {
    config: LinkConfig,
}

impl LinkManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn legacy_service_uuid(mut self, uuid: Uuid) -> Self {
        self.config.legacy_service_uuid = uuid;
        self
    }

    pub fn attribute_characteristic_uuid(mut self, uuid: Uuid) -> Self {
        self.config.attribute_characteristic_uuid = uuid;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.config.auto_connect = enabled;
        self
    }

    pub fn ignore_unnamed_devices(mut self, enabled: bool) -> Self {
        self.config.ignore_unnamed_devices = enabled;
        self
    }

    pub fn send_format(mut self, format: PayloadFormat) -> Self {
        self.config.send_format = format;
        self
    }

    pub fn read_format(mut self, format: PayloadFormat) -> Self {
        self.config.read_format = format;
        self
    }

    pub fn scan_duration(mut self, duration: Duration) -> Self {
        self.config = self.config.with_scan_duration(duration);
        self
    }

    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config = self.config.with_connect_timeout(timeout);
        self
    }

    /// Build the manager; must be called inside a Tokio runtime
    pub async fn build<R, S>(self, mut radio: R, store: S) -> LinkResult<LinkManager>
    where
        R: Radio,
        S: DeviceStore,
    {
        let config = self.config;
        config.validate()?;

        let (signals, radio_events) = radio_event_channel();
        radio.attach_events(signals.clone())?;

        let radio: Arc<dyn Radio> = Arc::new(radio);
        let store: Arc<dyn DeviceStore> = Arc::new(store);
        let events = EventBus::new(config.event_capacity);

        let coordinator = ConnectionCoordinator::new(
            radio.clone(),
            store.clone(),
            events.clone(),
            config.clone(),
            signals,
        );
        let discovery = DiscoveryAggregator::new(
            radio,
            events.clone(),
            config.ignore_unnamed_devices,
            config.scan_duration(),
        );
        let reconnect = ReconnectScheduler::new(coordinator.clone(), store.clone());

        let pump = tokio::spawn(pump_radio_events(
            radio_events,
            coordinator.clone(),
            discovery.clone(),
        ));

        reconnect.apply(config.reconnect);

        let manager = LinkManager {
            config,
            events,
            store,
            coordinator,
            discovery,
            reconnect,
            pump: Mutex::new(Some(pump)),
            shut_down: AtomicBool::new(false),
        };

        if manager.config.auto_connect {
            manager.auto_connect().await;
        }

        info!("Link manager started");
        Ok(manager)
    }
}

// ----------------------------------------------------------------------------
// Link Manager
// ----------------------------------------------------------------------------

/// Application-facing handle over the connection lifecycle
pub struct LinkManager {
    config: LinkConfig,
    events: EventBus,
    store: Arc<dyn DeviceStore>,
    coordinator: ConnectionCoordinator,
    discovery: DiscoveryAggregator,
    reconnect: ReconnectScheduler,
    pump: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl LinkManager {
    pub fn builder() -> LinkManagerBuilder {
        LinkManagerBuilder::new()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Register an observer for every subsequent event
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    fn ensure_running(&self) -> LinkResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(LinkError::Shutdown);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------------

    /// Start connecting to `address` over `transport`
    ///
    /// The result of the attempt is reported as a `ConnectionChanged` event.
    pub async fn connect(&self, address: &str, transport: TransportType) -> LinkResult<()> {
        self.ensure_running()?;
        self.coordinator.connect(address, transport).await
    }

    pub async fn connect_device(&self, device: &Device) -> LinkResult<()> {
        self.connect(&device.address, device.transport).await
    }

    pub async fn disconnect(&self) -> LinkResult<()> {
        self.coordinator.disconnect().await
    }

    /// Send raw bytes to the connected peer
    pub async fn send(&self, payload: &[u8]) -> LinkResult<()> {
        self.ensure_running()?;
        self.coordinator.send(payload).await
    }

    /// Send a string encoded with the configured send format
    pub async fn send_text(&self, data: &str) -> LinkResult<()> {
        let payload = codec::encode_outgoing(data, self.config.send_format)?;
        self.send(&payload).await
    }

    pub async fn is_connected(&self) -> bool {
        self.coordinator.is_connected().await
    }

    pub async fn connected_device(&self) -> Option<Device> {
        self.coordinator.connected_device().await
    }

    pub async fn status(&self) -> LinkStatus {
        self.coordinator.status().await
    }

    /// Characteristics reported by the connected attribute peer
    pub async fn characteristics(&self) -> Vec<Uuid> {
        self.coordinator.characteristics().await
    }

    async fn auto_connect(&self) {
        let last = match self.store.load_last_device() {
            Ok(Some(last)) => last,
            Ok(None) => {
                debug!("Auto-connect enabled but no device stored");
                return;
            }
            Err(e) => {
                warn!("Auto-connect skipped, failed to load last device: {}", e);
                return;
            }
        };

        self.coordinator.arm_auto_connect().await;
        if let Err(e) = self
            .coordinator
            .begin_connect(&last.address, last.transport, ConnectOrigin::AutoConnect)
            .await
        {
            warn!("Auto-connect to {} not started: {}", last.address, e);
        }
    }

    // ------------------------------------------------------------------------
    // Reconnect
    // ------------------------------------------------------------------------

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        self.reconnect.policy()
    }

    /// Replace the reconnect policy, re-arming or disarming the timer
    pub fn set_reconnect_policy(&self, policy: ReconnectPolicy) -> LinkResult<()> {
        self.ensure_running()?;
        if policy.interval_ms == 0 {
            return Err(LinkError::config("reconnect interval must be greater than zero"));
        }
        self.reconnect.apply(policy);
        Ok(())
    }

    pub fn is_reconnect_armed(&self) -> bool {
        self.reconnect.is_armed()
    }

    /// Run one reconnect tick now
    pub async fn reconnect_now(&self) -> ReconnectOutcome {
        self.reconnect.reconnect_once().await
    }

    // ------------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------------

    pub async fn start_discovery(&self) -> LinkResult<()> {
        self.ensure_running()?;
        self.discovery.start().await
    }

    pub async fn stop_discovery(&self) {
        self.discovery.stop().await
    }

    pub fn is_discovering(&self) -> bool {
        self.discovery.is_scanning()
    }

    pub fn paired_devices(&self) -> Vec<Device> {
        self.discovery.paired_devices()
    }

    pub fn unpaired_devices(&self) -> Vec<Device> {
        self.discovery.unpaired_devices()
    }

    // ------------------------------------------------------------------------
    // Storage
    // ------------------------------------------------------------------------

    pub fn last_device(&self) -> LinkResult<Option<LastDevice>> {
        Ok(self.store.load_last_device()?)
    }

    /// Forget the stored last device
    pub fn forget_last_device(&self) -> LinkResult<()> {
        self.store.clear_last_device()?;
        info!("Forgot last device");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    /// Stop reconnecting, end discovery, close the session and stop
    /// dispatching hardware callbacks
    pub async fn shutdown(&self) -> LinkResult<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.reconnect.disarm();
        self.discovery.stop().await;
        self.coordinator.disconnect().await?;

        if let Some(pump) = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take() {
            pump.abort();
        }
        info!("Link manager stopped");
        Ok(())
    }
}

impl Drop for LinkManager {
    fn drop(&mut self) {
        self.discovery.cancel_timer();
        if let Some(pump) = self
            .pump
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pump.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Hardware Callback Pump
// ----------------------------------------------------------------------------

async fn pump_radio_events(
    mut events: RadioEventReceiver,
    coordinator: ConnectionCoordinator,
    discovery: DiscoveryAggregator,
) {
    while let Some(event) = events.recv().await {
        match event {
            RadioEvent::DeviceFound { device, bonded } => discovery.on_device_found(device, bonded),
            RadioEvent::ScanStarted { transport } => discovery.on_scan_started(transport),
            RadioEvent::ScanFinished { transport } => discovery.on_scan_finished(transport).await,
            other => coordinator.handle_radio_event(other).await,
        }
    }
    debug!("Radio event channel closed");
}
