//! Platform radio implementing the link manager's hardware interface

use async_trait::async_trait;
use linkport_core::{Radio, RadioError, RadioEventSender, StreamConnection, TransportType};
use uuid::Uuid;

use crate::attribute::AttributeRadio;
use crate::config::RadioConfig;
use crate::error::RadioBackendError;
use crate::legacy::PlatformLegacy;
use crate::sink::EventSink;

// ----------------------------------------------------------------------------
// Platform Radio
// ----------------------------------------------------------------------------

/// Both transports of the local adapter behind one [`Radio`]
pub struct PlatformRadio {
    attribute: AttributeRadio,
    legacy: PlatformLegacy,
    sink: EventSink,
}

impl PlatformRadio {
    /// Open the platform Bluetooth stacks
    ///
    /// Fails only when no BLE adapter is usable; the legacy transport
    /// degrades to unavailable on its own.
    pub async fn new(config: RadioConfig) -> Result<Self, RadioBackendError> {
        let sink = EventSink::default();
        let attribute = AttributeRadio::new(&config, sink.clone()).await?;
        let legacy = PlatformLegacy::new(&config, sink.clone()).await;

        Ok(Self {
            attribute,
            legacy,
            sink,
        })
    }

    /// Whether stream sockets can be opened on this platform
    pub fn supports_legacy(&self) -> bool {
        self.legacy.is_available()
    }
}

#[async_trait]
impl Radio for PlatformRadio {
    fn attach_events(&mut self, events: RadioEventSender) -> Result<(), RadioError> {
        self.sink.attach(events)
    }

    async fn start_scan(&self, transport: TransportType) -> Result<(), RadioError> {
        match transport {
            TransportType::Legacy => self.legacy.start_scan().await,
            TransportType::AttributeBased => self.attribute.start_scan().await,
        }
    }

    async fn stop_scan(&self, transport: TransportType) -> Result<(), RadioError> {
        match transport {
            TransportType::Legacy => self.legacy.stop_scan().await,
            TransportType::AttributeBased => self.attribute.stop_scan().await,
        }
    }

    async fn connect_stream(
        &self,
        address: &str,
        service: Uuid,
    ) -> Result<StreamConnection, RadioError> {
        self.legacy.connect(address, service).await
    }

    async fn connect_attribute(&self, address: &str) -> Result<(), RadioError> {
        self.attribute.connect(address).await
    }

    async fn discover_services(&self, address: &str) -> Result<(), RadioError> {
        self.attribute.discover_services(address).await
    }

    async fn subscribe(&self, address: &str, characteristic: Uuid) -> Result<(), RadioError> {
        self.attribute.subscribe(address, characteristic).await
    }

    async fn write_characteristic(
        &self,
        address: &str,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), RadioError> {
        self.attribute.write(address, characteristic, value).await
    }

    async fn disconnect_attribute(&self, address: &str) -> Result<(), RadioError> {
        self.attribute.disconnect(address).await
    }

    async fn close_attribute(&self, address: &str) -> Result<(), RadioError> {
        self.attribute.close(address);
        Ok(())
    }
}
