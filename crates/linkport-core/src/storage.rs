//! Persistence of the last connected device

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::{LastDevice, TransportType};
use crate::error::StorageError;

// ----------------------------------------------------------------------------
// Storage Trait
// ----------------------------------------------------------------------------

/// Storage for the "last paired device" record
pub trait DeviceStore: Send + Sync + 'static {
    /// Load the stored record, if any
    fn load_last_device(&self) -> Result<Option<LastDevice>, StorageError>;

    /// Replace the stored record
    fn save_last_device(&self, device: &LastDevice) -> Result<(), StorageError>;

    /// Forget the stored record
    fn clear_last_device(&self) -> Result<(), StorageError>;
}

// ----------------------------------------------------------------------------
// Memory Storage Implementation
// ----------------------------------------------------------------------------

/// In-memory store; clones share the same slot
#[derive(Debug, Clone, Default)]
pub struct MemoryDeviceStore {
    slot: Arc<Mutex<Option<LastDevice>>>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `device`
    pub fn with_device(device: LastDevice) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(device))),
        }
    }
}

impl DeviceStore for MemoryDeviceStore {
    fn load_last_device(&self) -> Result<Option<LastDevice>, StorageError> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save_last_device(&self, device: &LastDevice) -> Result<(), StorageError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(device.clone());
        Ok(())
    }

    fn clear_last_device(&self) -> Result<(), StorageError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// JSON File Storage Implementation
// ----------------------------------------------------------------------------

/// On-disk record; the transport is kept as its numeric code
#[derive(Debug, Serialize, Deserialize)]
struct StoredDevice {
    address: String,
    device_type: u8,
}

/// Store backed by a small JSON document
#[derive(Debug, Clone)]
pub struct JsonFileDeviceStore {
    path: PathBuf,
}

impl JsonFileDeviceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeviceStore for JsonFileDeviceStore {
    fn load_last_device(&self) -> Result<Option<LastDevice>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.path)?;
        let stored: StoredDevice = serde_json::from_str(&contents)?;
        let transport = TransportType::from_code(stored.device_type)
            .ok_or(StorageError::UnknownDeviceType(stored.device_type))?;

        Ok(Some(LastDevice::new(stored.address, transport)))
    }

    fn save_last_device(&self, device: &LastDevice) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let stored = StoredDevice {
            address: device.address.clone(),
            device_type: device.transport.code(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&stored)?)?;
        debug!("Saved last device {} to {}", device.address, self.path.display());
        Ok(())
    }

    fn clear_last_device(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryDeviceStore::new();
        assert_eq!(store.load_last_device().unwrap(), None);

        let device = LastDevice::new("AA:BB", TransportType::AttributeBased);
        assert_ok!(store.save_last_device(&device));
        assert_eq!(store.load_last_device().unwrap(), Some(device));

        assert_ok!(store.clear_last_device());
        assert_eq!(store.load_last_device().unwrap(), None);
    }

    #[test]
    fn memory_store_clones_share_state() {
        let store = MemoryDeviceStore::new();
        let view = store.clone();
        store
            .save_last_device(&LastDevice::new("AA:BB", TransportType::Legacy))
            .unwrap();
        assert!(view.load_last_device().unwrap().is_some());
    }

    #[test]
    fn json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileDeviceStore::new(dir.path().join("nested").join("device.json"));
        assert_eq!(store.load_last_device().unwrap(), None);

        let device = LastDevice::new("00:11:22:33:44:55", TransportType::Legacy);
        assert_ok!(store.save_last_device(&device));
        assert_eq!(store.load_last_device().unwrap(), Some(device));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"device_type\": 1"));

        assert_ok!(store.clear_last_device());
        assert_ok!(store.clear_last_device());
        assert_eq!(store.load_last_device().unwrap(), None);
    }

    #[test]
    fn json_store_rejects_unknown_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        std::fs::write(&path, r#"{"address":"AA:BB","device_type":9}"#).unwrap();

        let store = JsonFileDeviceStore::new(path);
        let err = assert_err!(store.load_last_device());
        assert!(matches!(err, StorageError::UnknownDeviceType(9)));
    }
}
