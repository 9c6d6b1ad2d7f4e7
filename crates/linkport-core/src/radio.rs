//! Radio hardware collaborator interface
//!
//! The hardware layer is driven through the [`Radio`] trait. Its asynchronous
//! callbacks (discovery results, attribute connection state, notifications,
//! write results) are delivered as [`RadioEvent`]s on the channel handed to
//! [`Radio::attach_events`].

use std::fmt;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::device::{Device, TransportType};
use crate::error::RadioError;

// ----------------------------------------------------------------------------
// Stream Types
// ----------------------------------------------------------------------------

/// Bidirectional byte stream backing a legacy session
pub trait LinkStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> LinkStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedLinkStream = Box<dyn LinkStream>;

/// An opened legacy stream socket
pub struct StreamConnection {
    /// Name the hardware reports for the peer (possibly empty)
    pub name: String,
    pub stream: BoxedLinkStream,
}

impl StreamConnection {
    pub fn new(name: impl Into<String>, stream: impl LinkStream) -> Self {
        Self {
            name: name.into(),
            stream: Box::new(stream),
        }
    }
}

impl fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Hardware Callbacks
// ----------------------------------------------------------------------------

/// Asynchronous callbacks from the hardware layer
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    /// A peer was found during a scan
    DeviceFound { device: Device, bonded: bool },
    /// A transport's scan started
    ScanStarted { transport: TransportType },
    /// A transport's scan finished
    ScanFinished { transport: TransportType },
    /// An attribute connection was established
    AttributeConnected { address: String, name: String },
    /// An attribute connection dropped, or a pending attribute connect failed
    AttributeDisconnected { address: String },
    /// Services on a connected attribute peer were enumerated
    ServicesDiscovered {
        address: String,
        characteristics: Vec<Uuid>,
    },
    /// A subscribed characteristic notified a new value
    CharacteristicChanged {
        address: String,
        characteristic: Uuid,
        value: Vec<u8>,
    },
    /// Result of an earlier characteristic write
    CharacteristicWritten { address: String, success: bool },
    /// A legacy session's read loop hit end-of-stream or an I/O error
    StreamClosed { address: String },
}

pub type RadioEventSender = mpsc::UnboundedSender<RadioEvent>;
pub type RadioEventReceiver = mpsc::UnboundedReceiver<RadioEvent>;

/// Create the channel carrying hardware callbacks
pub fn radio_event_channel() -> (RadioEventSender, RadioEventReceiver) {
    mpsc::unbounded_channel()
}

// ----------------------------------------------------------------------------
// Radio Trait
// ----------------------------------------------------------------------------

/// Operations the link manager needs from the radio hardware
#[async_trait]
pub trait Radio: Send + Sync + 'static {
    /// Attach the channel that receives hardware callbacks
    ///
    /// Called exactly once, before the radio is shared.
    fn attach_events(&mut self, events: RadioEventSender) -> Result<(), RadioError>;

    /// Start scanning on one transport, reporting `ScanStarted` when running
    async fn start_scan(&self, transport: TransportType) -> Result<(), RadioError>;

    /// Stop scanning on one transport, reporting `ScanFinished` when stopped
    async fn stop_scan(&self, transport: TransportType) -> Result<(), RadioError>;

    /// Open a legacy stream socket to `address` for `service`
    async fn connect_stream(
        &self,
        address: &str,
        service: Uuid,
    ) -> Result<StreamConnection, RadioError>;

    /// Issue an attribute connect; the outcome arrives as a callback
    async fn connect_attribute(&self, address: &str) -> Result<(), RadioError>;

    /// Enumerate services, reporting `ServicesDiscovered`
    async fn discover_services(&self, address: &str) -> Result<(), RadioError>;

    /// Enable notifications on `characteristic`
    async fn subscribe(&self, address: &str, characteristic: Uuid) -> Result<(), RadioError>;

    /// Issue a single write; the result arrives as `CharacteristicWritten`
    async fn write_characteristic(
        &self,
        address: &str,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), RadioError>;

    /// Request an attribute disconnect
    async fn disconnect_attribute(&self, address: &str) -> Result<(), RadioError>;

    /// Release the attribute handle for `address`
    async fn close_attribute(&self, address: &str) -> Result<(), RadioError>;
}
