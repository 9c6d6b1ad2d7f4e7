//! Error types for the link manager
//!
//! `LinkError` is what application code sees. `RadioError` and `StorageError`
//! are produced by the hardware and persistence collaborators and fold into
//! `LinkError` through `From`.

use thiserror::Error;

use crate::device::TransportType;

// ----------------------------------------------------------------------------
// Collaborator Errors
// ----------------------------------------------------------------------------

/// Errors reported by the radio hardware layer
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("Radio adapter not available")]
    AdapterUnavailable,

    #[error("Transport not available on this platform: {transport}")]
    TransportUnavailable { transport: TransportType },

    #[error("Failed to connect to {address}: {reason}")]
    ConnectFailed { address: String, reason: String },

    #[error("Radio I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scan failed: {0}")]
    ScanFailed(String),

    #[error("Characteristic write failed: {0}")]
    WriteFailed(String),

    #[error("Device not connected: {address}")]
    NotConnected { address: String },

    #[error("Invalid device address: {0}")]
    InvalidAddress(String),

    #[error("Radio event channel already attached")]
    EventsAlreadyAttached,
}

/// Errors reported by the last-device store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown stored device type: {0}")]
    UnknownDeviceType(u8),
}

// ----------------------------------------------------------------------------
// Link Errors
// ----------------------------------------------------------------------------

/// Errors surfaced across the public `LinkManager` API
///
/// Connect failures coming from the hardware are never returned from
/// `connect()`; they arrive as a `ConnectionChanged { connected: false, .. }`
/// event instead.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Already connected to {address}, disconnect first")]
    AlreadyConnected { address: String },

    #[error("Connection attempt to {address} already in progress")]
    ConnectInProgress { address: String },

    #[error("Disconnect in progress")]
    Disconnecting,

    #[error("Not connected")]
    NotConnected,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Link manager has been shut down")]
    Shutdown,
}

impl LinkError {
    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        LinkError::Config {
            reason: reason.into(),
        }
    }

    /// Whether this error is the "busy" rejection of the connect gate
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            LinkError::AlreadyConnected { .. }
                | LinkError::ConnectInProgress { .. }
                | LinkError::Disconnecting
        )
    }
}

/// Result type for link operations
pub type LinkResult<T> = Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radio_errors_convert_into_link_errors() {
        let err: LinkError = RadioError::AdapterUnavailable.into();
        assert!(matches!(err, LinkError::Radio(RadioError::AdapterUnavailable)));
        assert_eq!(err.to_string(), "Radio error: Radio adapter not available");
    }

    #[test]
    fn busy_classification() {
        assert!(LinkError::AlreadyConnected {
            address: "AA:BB".into()
        }
        .is_busy());
        assert!(LinkError::Disconnecting.is_busy());
        assert!(!LinkError::NotConnected.is_busy());
    }
}
