//! Attribute transport over BLE using btleplug
//!
//! Central role only: scanning, connecting, service discovery, notification
//! subscription and characteristic writes. Peripherals are keyed by their
//! hardware address as rendered by btleplug (`AA:BB:CC:DD:EE:FF`).

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{Stream, StreamExt};
use linkport_core::{Device, RadioError, RadioEvent, TransportType};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RadioConfig;
use crate::error::RadioBackendError;
use crate::sink::EventSink;

type Peers = Arc<RwLock<HashMap<String, Peripheral>>>;

// ----------------------------------------------------------------------------
// Attribute Radio
// ----------------------------------------------------------------------------

/// BLE central driving attribute connections
pub struct AttributeRadio {
    adapter: Adapter,
    peers: Peers,
    scanning: Arc<AtomicBool>,
    notifications: Mutex<HashMap<String, JoinHandle<()>>>,
    write_type: WriteType,
    sink: EventSink,
    event_task: JoinHandle<()>,
}

impl AttributeRadio {
    /// Open the configured adapter and start listening to central events
    pub(crate) async fn new(config: &RadioConfig, sink: EventSink) -> Result<Self, RadioBackendError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .nth(config.adapter_index)
            .ok_or(RadioBackendError::AdapterNotAvailable)?;

        let events = adapter.events().await?;
        let peers: Peers = Arc::new(RwLock::new(HashMap::new()));
        let scanning = Arc::new(AtomicBool::new(false));

        let event_task = tokio::spawn(pump_central_events(
            adapter.clone(),
            events,
            peers.clone(),
            scanning.clone(),
            sink.clone(),
        ));

        info!("BLE adapter {} initialized", config.adapter_index);
        Ok(Self {
            adapter,
            peers,
            scanning,
            notifications: Mutex::new(HashMap::new()),
            write_type: if config.write_without_response {
                WriteType::WithoutResponse
            } else {
                WriteType::WithResponse
            },
            sink,
            event_task,
        })
    }

    /// Find a peripheral seen during a scan or cached by the adapter
    async fn peripheral(&self, address: &str) -> Result<Peripheral, RadioBackendError> {
        if let Some(peripheral) = self.peers.read().await.get(address) {
            return Ok(peripheral.clone());
        }

        let known = self.adapter.peripherals().await?;
        let peripheral = known
            .into_iter()
            .find(|p| p.address().to_string().eq_ignore_ascii_case(address))
            .ok_or_else(|| RadioBackendError::DeviceNotFound {
                address: address.to_string(),
            })?;

        self.peers
            .write()
            .await
            .insert(address.to_string(), peripheral.clone());
        Ok(peripheral)
    }

    async fn characteristic(
        &self,
        address: &str,
        uuid: Uuid,
    ) -> Result<(Peripheral, Characteristic), RadioBackendError> {
        let peripheral = self.peripheral(address).await?;
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| RadioBackendError::CharacteristicNotFound {
                address: address.to_string(),
                characteristic: uuid,
            })?;
        Ok((peripheral, characteristic))
    }

    // ------------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------------

    pub(crate) async fn start_scan(&self) -> Result<(), RadioError> {
        if self.scanning.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Err(e) = self.adapter.start_scan(ScanFilter::default()).await {
            self.scanning.store(false, Ordering::Release);
            return Err(RadioError::ScanFailed(e.to_string()));
        }

        info!("Started BLE scanning");
        self.sink.send(RadioEvent::ScanStarted {
            transport: TransportType::AttributeBased,
        });
        Ok(())
    }

    pub(crate) async fn stop_scan(&self) -> Result<(), RadioError> {
        if !self.scanning.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let result = self
            .adapter
            .stop_scan()
            .await
            .map_err(|e| RadioError::ScanFailed(e.to_string()));

        info!("Stopped BLE scanning");
        self.sink.send(RadioEvent::ScanFinished {
            transport: TransportType::AttributeBased,
        });
        result
    }

    // ------------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------------

    /// Connect in the background, reporting the outcome as a callback
    pub(crate) async fn connect(&self, address: &str) -> Result<(), RadioError> {
        let peripheral = self.peripheral(address).await.map_err(|e| {
            RadioError::ConnectFailed {
                address: address.to_string(),
                reason: e.to_string(),
            }
        })?;

        let sink = self.sink.clone();
        let address = address.to_string();
        tokio::spawn(async move {
            match peripheral.connect().await {
                Ok(()) => {
                    let name = local_name(&peripheral).await;
                    info!("Connected to BLE peripheral {}", address);
                    sink.send(RadioEvent::AttributeConnected { address, name });
                }
                Err(e) => {
                    warn!("Failed to connect to BLE peripheral {}: {}", address, e);
                    sink.send(RadioEvent::AttributeDisconnected { address });
                }
            }
        });
        Ok(())
    }

    pub(crate) async fn discover_services(&self, address: &str) -> Result<(), RadioError> {
        let peripheral = self.peripheral(address).await?;
        peripheral
            .discover_services()
            .await
            .map_err(RadioBackendError::from)?;

        let characteristics: Vec<Uuid> = peripheral
            .characteristics()
            .into_iter()
            .map(|c| c.uuid)
            .collect();
        debug!(
            "Discovered {} characteristics on {}",
            characteristics.len(),
            address
        );
        self.sink.send(RadioEvent::ServicesDiscovered {
            address: address.to_string(),
            characteristics,
        });
        Ok(())
    }

    pub(crate) async fn subscribe(&self, address: &str, uuid: Uuid) -> Result<(), RadioError> {
        let (peripheral, characteristic) = self.characteristic(address, uuid).await?;
        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(RadioBackendError::from)?;
        let notifications = peripheral
            .notifications()
            .await
            .map_err(RadioBackendError::from)?;

        let sink = self.sink.clone();
        let owner = address.to_string();
        let handle = tokio::spawn(async move {
            let mut notifications = notifications;
            while let Some(notification) = notifications.next().await {
                sink.send(RadioEvent::CharacteristicChanged {
                    address: owner.clone(),
                    characteristic: notification.uuid,
                    value: notification.value,
                });
            }
            debug!("Notification stream for {} ended", owner);
        });

        if let Some(previous) = self
            .notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.to_string(), handle)
        {
            previous.abort();
        }
        Ok(())
    }

    /// Single write; the outcome is also reported as a callback
    pub(crate) async fn write(
        &self,
        address: &str,
        uuid: Uuid,
        value: &[u8],
    ) -> Result<(), RadioError> {
        let (peripheral, characteristic) = self.characteristic(address, uuid).await?;
        let result = peripheral.write(&characteristic, value, self.write_type).await;

        if let Err(e) = &result {
            warn!("Failed to write {} bytes to {}: {}", value.len(), address, e);
        }
        self.sink.send(RadioEvent::CharacteristicWritten {
            address: address.to_string(),
            success: result.is_ok(),
        });
        Ok(())
    }

    pub(crate) async fn disconnect(&self, address: &str) -> Result<(), RadioError> {
        let peripheral = self.peripheral(address).await?;
        peripheral
            .disconnect()
            .await
            .map_err(RadioBackendError::from)?;
        Ok(())
    }

    /// Stop forwarding notifications for `address`
    pub(crate) fn close(&self, address: &str) {
        if let Some(handle) = self
            .notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(address)
        {
            handle.abort();
        }
    }
}

impl Drop for AttributeRadio {
    fn drop(&mut self) {
        self.event_task.abort();
        for (_, handle) in self
            .notifications
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
        {
            handle.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Central Events
// ----------------------------------------------------------------------------

async fn local_name(peripheral: &Peripheral) -> String {
    match peripheral.properties().await {
        Ok(Some(properties)) => properties.local_name.unwrap_or_default(),
        _ => String::new(),
    }
}

async fn pump_central_events(
    adapter: Adapter,
    mut events: Pin<Box<dyn Stream<Item = CentralEvent> + Send>>,
    peers: Peers,
    scanning: Arc<AtomicBool>,
    sink: EventSink,
) {
    while let Some(event) = events.next().await {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                if !scanning.load(Ordering::Acquire) {
                    continue;
                }
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let address = peripheral.address().to_string();
                let name = local_name(&peripheral).await;
                peers.write().await.insert(address.clone(), peripheral);

                sink.send(RadioEvent::DeviceFound {
                    device: Device::new(name, address, TransportType::AttributeBased),
                    // Bond state is not exposed by the central API
                    bonded: false,
                });
            }
            CentralEvent::DeviceDisconnected(id) => {
                if let Ok(peripheral) = adapter.peripheral(&id).await {
                    let address = peripheral.address().to_string();
                    debug!("BLE peripheral {} disconnected", address);
                    sink.send(RadioEvent::AttributeDisconnected { address });
                }
            }
            _ => {}
        }
    }
    debug!("BLE central event stream ended");
}
