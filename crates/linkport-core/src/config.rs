//! Link manager configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LinkError, LinkResult};

/// Serial port profile service used for legacy stream sockets
pub const DEFAULT_LEGACY_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Characteristic carrying serial data on common attribute-based serial modules
pub const DEFAULT_ATTRIBUTE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000FFE1_0000_1000_8000_00805F9B34FB);

/// Default interval between reconnect attempts
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 10_000;

// ----------------------------------------------------------------------------
// Reconnect Policy
// ----------------------------------------------------------------------------

/// Periodic reconnect behaviour
///
/// Retries forever at a fixed interval; there is no attempt cap and no backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Whether the reconnect timer is armed
    pub enabled: bool,
    /// Interval between ticks in milliseconds
    pub interval_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
        }
    }
}

impl ReconnectPolicy {
    /// An enabled policy ticking every `interval_ms`
    pub fn every(interval_ms: u64) -> Self {
        Self {
            enabled: true,
            interval_ms,
        }
    }

    /// A disabled policy keeping the default interval
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

// ----------------------------------------------------------------------------
// Payload Format
// ----------------------------------------------------------------------------

/// How string payloads are mapped to and from wire bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// UTF-8 text
    #[default]
    Text,
    /// Hex digits, e.g. `"0A 1B ff"`
    Hex,
}

// ----------------------------------------------------------------------------
// Link Configuration
// ----------------------------------------------------------------------------

/// Configuration for the link manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Service UUID used to open legacy stream sockets
    pub legacy_service_uuid: Uuid,
    /// Characteristic used for attribute-based writes and notifications
    pub attribute_characteristic_uuid: Uuid,
    /// Periodic reconnect policy
    pub reconnect: ReconnectPolicy,
    /// Connect to the stored last device when the manager is built
    pub auto_connect: bool,
    /// Drop discovery results that carry no name
    pub ignore_unnamed_devices: bool,
    /// Encoding applied by `send_text`
    pub send_format: PayloadFormat,
    /// Rendering applied to received payloads
    pub read_format: PayloadFormat,
    /// How long a discovery session runs before both scans are stopped
    pub scan_duration_ms: u64,
    /// Optional upper bound on a single connect attempt
    pub connect_timeout_ms: Option<u64>,
    /// Buffer size of the event bus
    pub event_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            legacy_service_uuid: DEFAULT_LEGACY_SERVICE_UUID,
            attribute_characteristic_uuid: DEFAULT_ATTRIBUTE_CHARACTERISTIC_UUID,
            reconnect: ReconnectPolicy::default(),
            auto_connect: false,
            ignore_unnamed_devices: false,
            send_format: PayloadFormat::Text,
            read_format: PayloadFormat::Text,
            scan_duration_ms: 12_000,
            connect_timeout_ms: None,
            event_capacity: 256,
        }
    }
}

impl LinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the legacy service UUID
    pub fn with_legacy_service_uuid(mut self, uuid: Uuid) -> Self {
        self.legacy_service_uuid = uuid;
        self
    }

    /// Set the attribute characteristic UUID
    pub fn with_attribute_characteristic_uuid(mut self, uuid: Uuid) -> Self {
        self.attribute_characteristic_uuid = uuid;
        self
    }

    /// Set the reconnect policy
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Enable or disable auto-connect at build time
    pub fn with_auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    /// Enable or disable filtering of unnamed devices
    pub fn with_ignore_unnamed_devices(mut self, enabled: bool) -> Self {
        self.ignore_unnamed_devices = enabled;
        self
    }

    pub fn with_send_format(mut self, format: PayloadFormat) -> Self {
        self.send_format = format;
        self
    }

    pub fn with_read_format(mut self, format: PayloadFormat) -> Self {
        self.read_format = format;
        self
    }

    /// Set the discovery session length
    pub fn with_scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration_ms = duration.as_millis() as u64;
        self
    }

    /// Bound connect attempts (`None` waits for the hardware indefinitely)
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_millis(self.scan_duration_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Reject values the runtime cannot honour
    pub fn validate(&self) -> LinkResult<()> {
        if self.reconnect.interval_ms == 0 {
            return Err(LinkError::config("reconnect interval must be greater than zero"));
        }
        if self.scan_duration_ms == 0 {
            return Err(LinkError::config("scan duration must be greater than zero"));
        }
        if self.connect_timeout_ms == Some(0) {
            return Err(LinkError::config("connect timeout must be greater than zero"));
        }
        if self.event_capacity == 0 {
            return Err(LinkError::config("event capacity must be greater than zero"));
        }
        Ok(())
    }
}
