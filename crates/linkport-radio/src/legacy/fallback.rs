//! Fallback legacy implementation for platforms without RFCOMM support

use linkport_core::{RadioError, StreamConnection, TransportType};
use tracing::warn;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Fallback Implementation
// ----------------------------------------------------------------------------

/// Legacy backend that rejects every operation
#[derive(Debug, Default)]
pub struct FallbackLegacy;

impl FallbackLegacy {
    pub fn new() -> Self {
        Self
    }

    pub fn start_scan(&self) -> Result<(), RadioError> {
        warn!("Legacy scanning not supported on this platform");
        Err(unavailable())
    }

    pub fn stop_scan(&self) -> Result<(), RadioError> {
        Ok(())
    }

    pub fn connect(&self, address: &str, _service: Uuid) -> Result<StreamConnection, RadioError> {
        warn!(
            "Cannot open a stream to {}: legacy transport not supported on this platform",
            address
        );
        Err(unavailable())
    }
}

fn unavailable() -> RadioError {
    RadioError::TransportUnavailable {
        transport: TransportType::Legacy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_reports_unavailable() {
        let legacy = FallbackLegacy::new();
        assert!(matches!(
            legacy.start_scan(),
            Err(RadioError::TransportUnavailable {
                transport: TransportType::Legacy
            })
        ));
        assert!(legacy.stop_scan().is_ok());
        assert!(legacy.connect("AA:BB", Uuid::nil()).is_err());
    }
}
