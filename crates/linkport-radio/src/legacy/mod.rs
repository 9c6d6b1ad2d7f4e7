//! Legacy stream transport and platform detection
//!
//! Stream sockets need the BlueZ RFCOMM API, so the legacy transport is only
//! available on Linux. Elsewhere every legacy operation reports the transport
//! as unavailable and discovery continues with the attribute transport alone.

pub mod fallback;
#[cfg(target_os = "linux")]
pub mod linux;

use linkport_core::{RadioError, StreamConnection};
use uuid::Uuid;

use crate::config::RadioConfig;
use crate::sink::EventSink;

// ----------------------------------------------------------------------------
// Platform Detection and Factory
// ----------------------------------------------------------------------------

/// Platform-specific legacy backend
pub enum PlatformLegacy {
    #[cfg(target_os = "linux")]
    Linux(linux::BluezLegacy),
    #[allow(dead_code)]
    Fallback(fallback::FallbackLegacy),
}

impl PlatformLegacy {
    /// Open the legacy backend for the current platform
    ///
    /// Failure to reach the platform stack degrades to the fallback so the
    /// attribute transport stays usable.
    pub(crate) async fn new(config: &RadioConfig, sink: EventSink) -> Self {
        #[cfg(target_os = "linux")]
        {
            match linux::BluezLegacy::new(config, sink).await {
                Ok(backend) => Self::Linux(backend),
                Err(e) => {
                    tracing::warn!("Legacy transport unavailable: {}", e);
                    Self::Fallback(fallback::FallbackLegacy::new())
                }
            }
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = (config, sink);
            Self::Fallback(fallback::FallbackLegacy::new())
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Fallback(_))
    }

    pub(crate) async fn start_scan(&self) -> Result<(), RadioError> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(backend) => backend.start_scan().await,
            Self::Fallback(backend) => backend.start_scan(),
        }
    }

    pub(crate) async fn stop_scan(&self) -> Result<(), RadioError> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(backend) => backend.stop_scan(),
            Self::Fallback(backend) => backend.stop_scan(),
        }
    }

    pub(crate) async fn connect(
        &self,
        address: &str,
        service: Uuid,
    ) -> Result<StreamConnection, RadioError> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(backend) => backend.connect(address, service).await,
            Self::Fallback(backend) => backend.connect(address, service),
        }
    }
}
