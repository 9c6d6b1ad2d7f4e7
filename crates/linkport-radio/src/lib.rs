//! Radio hardware backend for linkport
//!
//! This crate implements the [`Radio`](linkport_core::Radio) trait from
//! `linkport-core` on top of the platform Bluetooth stacks.
//!
//! ## Architecture
//!
//! - `config` - Backend configuration
//! - `error` - Backend error type and its mapping into core errors
//! - `attribute` - BLE central role via btleplug (scan, connect, services,
//!   notifications, writes)
//! - [`legacy`] - Stream sockets: RFCOMM via bluer on Linux, unavailable
//!   elsewhere
//! - `radio` - [`PlatformRadio`], both transports behind one `Radio`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use linkport_core::{LinkManager, MemoryDeviceStore, TransportType};
//! use linkport_radio::{PlatformRadio, RadioConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let radio = PlatformRadio::new(RadioConfig::default()).await?;
//! let manager = LinkManager::builder()
//!     .build(radio, MemoryDeviceStore::new())
//!     .await?;
//!
//! manager.connect("00:11:22:33:44:55", TransportType::Legacy).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Support
//!
//! - **Linux**: both transports (BlueZ for stream sockets, btleplug for BLE)
//! - **Other platforms**: attribute transport only

mod attribute;
mod config;
mod error;
pub mod legacy;
mod radio;
mod sink;

// Public API exports
pub use attribute::AttributeRadio;
pub use config::RadioConfig;
pub use error::RadioBackendError;
pub use legacy::PlatformLegacy;
pub use radio::PlatformRadio;
