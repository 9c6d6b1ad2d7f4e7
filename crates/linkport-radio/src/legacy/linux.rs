//! Linux legacy stream transport using bluer (BlueZ RFCOMM)

use std::sync::{Mutex, PoisonError};

use bluer::rfcomm::{SocketAddr, Stream};
use bluer::{Address, AdapterEvent, DiscoveryFilter, DiscoveryTransport};
use futures::StreamExt;
use linkport_core::{Device, RadioError, RadioEvent, StreamConnection, TransportType};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RadioConfig;
use crate::error::RadioBackendError;
use crate::sink::EventSink;

// ----------------------------------------------------------------------------
// Linux Implementation
// ----------------------------------------------------------------------------

pub struct BluezLegacy {
    _session: bluer::Session,
    adapter: bluer::Adapter,
    channel: u8,
    report_bonded: bool,
    sink: EventSink,
    discovery: Mutex<Option<JoinHandle<()>>>,
}

impl BluezLegacy {
    pub(crate) async fn new(config: &RadioConfig, sink: EventSink) -> Result<Self, RadioBackendError> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;

        if !adapter.is_powered().await.unwrap_or(false) {
            adapter.set_powered(true).await?;
        }

        info!("BlueZ adapter {} initialized for stream sockets", adapter.name());
        Ok(Self {
            _session: session,
            adapter,
            channel: config.rfcomm_channel,
            report_bonded: config.report_bonded_devices,
            sink,
            discovery: Mutex::new(None),
        })
    }

    pub(crate) async fn start_scan(&self) -> Result<(), RadioError> {
        if self
            .discovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
        {
            return Ok(());
        }

        if self.report_bonded {
            self.report_bonded_devices().await;
        }

        let filter = DiscoveryFilter {
            transport: DiscoveryTransport::BrEdr,
            ..Default::default()
        };
        if let Err(e) = self.adapter.set_discovery_filter(filter).await {
            warn!("Failed to restrict discovery to BR/EDR: {}", e);
        }

        // The discovery stream borrows the adapter, so it lives in the task
        let (started_tx, started_rx) = oneshot::channel();
        let adapter = self.adapter.clone();
        let sink = self.sink.clone();
        let task = tokio::spawn(async move {
            let events = match adapter.discover_devices().await {
                Ok(events) => {
                    let _ = started_tx.send(Ok(()));
                    events
                }
                Err(e) => {
                    let _ = started_tx.send(Err(e));
                    return;
                }
            };
            let mut events = Box::pin(events);
            while let Some(event) = events.next().await {
                if let AdapterEvent::DeviceAdded(address) = event {
                    if let Some((device, bonded)) = describe(&adapter, address).await {
                        sink.send(RadioEvent::DeviceFound { device, bonded });
                    }
                }
            }
            debug!("BlueZ discovery stream ended");
        });

        match started_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(RadioError::ScanFailed(e.to_string())),
            Err(_) => return Err(RadioError::ScanFailed("discovery task ended".into())),
        }

        *self
            .discovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);

        info!("Started BR/EDR discovery");
        self.sink.send(RadioEvent::ScanStarted {
            transport: TransportType::Legacy,
        });
        Ok(())
    }

    /// Dropping the discovery stream ends the BlueZ discovery session
    pub(crate) fn stop_scan(&self) -> Result<(), RadioError> {
        let task = self
            .discovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(task) = task {
            task.abort();
            info!("Stopped BR/EDR discovery");
            self.sink.send(RadioEvent::ScanFinished {
                transport: TransportType::Legacy,
            });
        }
        Ok(())
    }

    pub(crate) async fn connect(
        &self,
        address: &str,
        service: Uuid,
    ) -> Result<StreamConnection, RadioError> {
        let target: Address = address
            .parse()
            .map_err(|_| RadioError::InvalidAddress(address.to_string()))?;

        debug!(
            "Opening RFCOMM channel {} to {} for service {}",
            self.channel, target, service
        );
        let stream = Stream::connect(SocketAddr::new(target, self.channel))
            .await
            .map_err(|e| RadioError::ConnectFailed {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        let name = match self.adapter.device(target) {
            Ok(device) => device.name().await.ok().flatten().unwrap_or_default(),
            Err(_) => String::new(),
        };

        info!("RFCOMM stream to {} opened", target);
        Ok(StreamConnection::new(name, stream))
    }

    async fn report_bonded_devices(&self) {
        let addresses = match self.adapter.device_addresses().await {
            Ok(addresses) => addresses,
            Err(e) => {
                warn!("Failed to list known devices: {}", e);
                return;
            }
        };

        for address in addresses {
            if let Some((device, true)) = describe(&self.adapter, address).await {
                self.sink.send(RadioEvent::DeviceFound {
                    device,
                    bonded: true,
                });
            }
        }
    }
}

impl Drop for BluezLegacy {
    fn drop(&mut self) {
        if let Some(task) = self
            .discovery
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

async fn describe(adapter: &bluer::Adapter, address: Address) -> Option<(Device, bool)> {
    let device = adapter.device(address).ok()?;
    let name = device.name().await.ok().flatten().unwrap_or_default();
    let bonded = device.is_paired().await.unwrap_or(false);
    Some((
        Device::new(name, address.to_string(), TransportType::Legacy),
        bonded,
    ))
}
