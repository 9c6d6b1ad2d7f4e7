//! Radio backend configuration

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the platform radio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Index of the BLE adapter to use
    pub adapter_index: usize,
    /// RFCOMM channel used for legacy stream sockets
    pub rfcomm_channel: u8,
    /// Issue attribute writes without waiting for a response
    pub write_without_response: bool,
    /// Report paired devices when a legacy scan starts
    pub report_bonded_devices: bool,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            rfcomm_channel: 1,
            write_without_response: false,
            report_bonded_devices: true,
        }
    }
}

impl RadioConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set adapter index
    pub fn with_adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// Set RFCOMM channel
    pub fn with_rfcomm_channel(mut self, channel: u8) -> Self {
        self.rfcomm_channel = channel;
        self
    }

    pub fn with_write_without_response(mut self, enabled: bool) -> Self {
        self.write_without_response = enabled;
        self
    }

    pub fn with_report_bonded_devices(mut self, enabled: bool) -> Self {
        self.report_bonded_devices = enabled;
        self
    }
}
