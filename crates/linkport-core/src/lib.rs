//! Linkport Core
//!
//! Connection lifecycle, auto-reconnect and discovery for a single
//! point-to-point radio link. Two transports are supported behind one
//! contract: a legacy stream socket and an attribute channel with
//! asynchronous write/notify semantics.
//!
//! The hardware and the last-device storage are collaborators supplied by
//! the caller through the [`Radio`] and [`DeviceStore`] traits, so the core
//! carries no platform dependencies and runs against in-memory fakes in
//! tests.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod discovery;
pub mod error;
pub mod events;
pub mod manager;
pub mod radio;
pub mod reconnect;
pub mod registry;
pub mod session;
pub mod storage;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{
    LinkConfig, PayloadFormat, ReconnectPolicy, DEFAULT_ATTRIBUTE_CHARACTERISTIC_UUID,
    DEFAULT_LEGACY_SERVICE_UUID, DEFAULT_RECONNECT_INTERVAL_MS,
};
pub use coordinator::{ConnectionCoordinator, LinkPhase, LinkStatus};
pub use device::{Device, LastDevice, TransportType};
pub use discovery::{DiscoveryAggregator, DiscoveryLists};
pub use error::{LinkError, LinkResult, RadioError, StorageError};
pub use events::{EventBus, EventReceiver, LinkEvent, Notice};
pub use manager::{LinkManager, LinkManagerBuilder};
pub use radio::{
    radio_event_channel, BoxedLinkStream, LinkStream, Radio, RadioEvent, RadioEventReceiver,
    RadioEventSender, StreamConnection,
};
pub use reconnect::{ReconnectOutcome, ReconnectScheduler};
pub use registry::ConnectionRegistry;
pub use session::TransportSession;
pub use storage::{DeviceStore, JsonFileDeviceStore, MemoryDeviceStore};
