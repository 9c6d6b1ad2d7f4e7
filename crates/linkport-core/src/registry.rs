//! Source of truth for the current connection
//!
//! The registry is not synchronized on its own; the coordinator owns it
//! behind its state lock and performs every mutation there.

use uuid::Uuid;

use crate::device::{Device, TransportType};
use crate::session::TransportSession;

/// Holds the single current connection's identity and status
#[derive(Debug)]
pub struct ConnectionRegistry<S = TransportSession> {
    session: Option<S>,
    device: Option<Device>,
    connected: bool,
    last_attempted_address: Option<String>,
    auto_connect_armed: bool,
    characteristics: Vec<Uuid>,
}

impl<S> Default for ConnectionRegistry<S> {
    fn default() -> Self {
        Self {
            session: None,
            device: None,
            connected: false,
            last_attempted_address: None,
            auto_connect_armed: false,
            characteristics: Vec::new(),
        }
    }
}

impl<S> ConnectionRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful connection
    ///
    /// Returns the superseded session, which the caller must release.
    pub fn set_connected(&mut self, device: Device, session: S) -> Option<S> {
        let previous = self.session.replace(session);
        self.device = Some(device);
        self.connected = true;
        self.characteristics.clear();
        previous
    }

    /// Clear the current connection, handing back what was held
    pub fn set_disconnected(&mut self) -> Option<(Device, S)> {
        self.connected = false;
        self.characteristics.clear();
        match (self.device.take(), self.session.take()) {
            (Some(device), Some(session)) => Some((device, session)),
            _ => None,
        }
    }

    /// Current device and connection flag
    pub fn current(&self) -> (Option<&Device>, bool) {
        (self.device.as_ref(), self.is_connected())
    }

    pub fn is_connected(&self) -> bool {
        self.connected && self.session.is_some()
    }

    pub fn connected_device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    /// Whether the active session belongs to `address` over `transport`
    pub fn holds(&self, address: &str, transport: TransportType) -> bool {
        self.is_connected()
            && self
                .device
                .as_ref()
                .map(|d| d.address == address && d.transport == transport)
                .unwrap_or(false)
    }

    pub fn session(&self) -> Option<&S> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut S> {
        self.session.as_mut()
    }

    pub fn record_attempt(&mut self, address: &str) {
        self.last_attempted_address = Some(address.to_string());
    }

    pub fn last_attempted_address(&self) -> Option<&str> {
        self.last_attempted_address.as_deref()
    }

    /// Mark that an automatic connect has been issued
    pub fn arm_auto_connect(&mut self) {
        self.auto_connect_armed = true;
    }

    pub fn auto_connect_armed(&self) -> bool {
        self.auto_connect_armed
    }

    /// Characteristics reported by the last service discovery
    pub fn set_characteristics(&mut self, characteristics: Vec<Uuid>) {
        self.characteristics = characteristics;
    }

    pub fn characteristics(&self) -> &[Uuid] {
        &self.characteristics
    }
}
