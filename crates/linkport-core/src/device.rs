//! Peer device identity types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Transport Type
// ----------------------------------------------------------------------------

/// The two transport classes a peer can be reached over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    /// Classic bidirectional stream socket over a paired link
    Legacy,
    /// Attribute channel with asynchronous write/notify semantics
    AttributeBased,
}

impl TransportType {
    /// Both transports, in scan order
    pub const ALL: [TransportType; 2] = [TransportType::Legacy, TransportType::AttributeBased];

    /// Stable numeric code used when persisting the last device
    pub fn code(self) -> u8 {
        match self {
            TransportType::Legacy => 1,
            TransportType::AttributeBased => 2,
        }
    }

    /// Inverse of [`TransportType::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(TransportType::Legacy),
            2 => Some(TransportType::AttributeBased),
            _ => None,
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Legacy => write!(f, "legacy"),
            TransportType::AttributeBased => write!(f, "attribute"),
        }
    }
}

impl FromStr for TransportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" | "classic" | "spp" | "rfcomm" => Ok(TransportType::Legacy),
            "attribute" | "ble" | "gatt" => Ok(TransportType::AttributeBased),
            other => Err(format!("unknown transport type: {}", other)),
        }
    }
}

// ----------------------------------------------------------------------------
// Device
// ----------------------------------------------------------------------------

/// Identity snapshot of a peer, created fresh for every callback
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    /// Advertised name (possibly empty)
    pub name: String,
    /// Hardware address, the stable key for a peer
    pub address: String,
    /// Transport this snapshot was observed on
    pub transport: TransportType,
}

impl Device {
    pub fn new(name: impl Into<String>, address: impl Into<String>, transport: TransportType) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            transport,
        }
    }

    /// Whether the peer advertised a non-blank name
    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_name() {
            write!(f, "{} ({})", self.name, self.address)
        } else {
            write!(f, "<unnamed> ({})", self.address)
        }
    }
}

/// The last successfully connected peer, as persisted between runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastDevice {
    pub address: String,
    pub transport: TransportType,
}

impl LastDevice {
    pub fn new(address: impl Into<String>, transport: TransportType) -> Self {
        Self {
            address: address.into(),
            transport,
        }
    }
}

impl From<&Device> for LastDevice {
    fn from(device: &Device) -> Self {
        Self::new(device.address.clone(), device.transport)
    }
}
