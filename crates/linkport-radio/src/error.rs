//! Error types for the radio backend

use linkport_core::{RadioError, TransportType};
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors raised while driving the platform Bluetooth stacks
#[derive(Error, Debug)]
pub enum RadioBackendError {
    #[error("Bluetooth adapter not available")]
    AdapterNotAvailable,

    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    #[cfg(target_os = "linux")]
    #[error("BlueZ error: {0}")]
    BlueZ(#[from] bluer::Error),

    #[error("Device not discovered: {address}")]
    DeviceNotFound { address: String },

    #[error("Characteristic {characteristic} not found on {address}")]
    CharacteristicNotFound {
        address: String,
        characteristic: uuid::Uuid,
    },

    #[error("Invalid device address: {0}")]
    InvalidAddress(String),

    #[error("Transport not supported on this platform: {0}")]
    Unsupported(TransportType),
}

impl From<RadioBackendError> for RadioError {
    fn from(err: RadioBackendError) -> Self {
        match err {
            RadioBackendError::AdapterNotAvailable => RadioError::AdapterUnavailable,
            RadioBackendError::Unsupported(transport) => {
                RadioError::TransportUnavailable { transport }
            }
            RadioBackendError::InvalidAddress(address) => RadioError::InvalidAddress(address),
            RadioBackendError::DeviceNotFound { address } => RadioError::NotConnected { address },
            err @ RadioBackendError::CharacteristicNotFound { .. } => {
                RadioError::WriteFailed(err.to_string())
            }
            other => RadioError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                other.to_string(),
            )),
        }
    }
}
