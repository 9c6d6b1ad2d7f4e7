//! Configuration management for the linkport CLI
//!
//! Settings are read from a TOML file: the path given with `--config`, or
//! `linkport/linkport.toml` under the platform config directory when that
//! file exists. Missing keys fall back to defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use linkport_core::LinkConfig;
use linkport_radio::RadioConfig;

use crate::error::{CliError, Result};

const APP_DIR: &str = "linkport";
const CONFIG_FILE: &str = "linkport.toml";
const LAST_DEVICE_FILE: &str = "last_device.json";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the CLI application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Link manager behaviour
    pub link: LinkConfig,
    /// Radio backend settings
    pub radio: RadioConfig,
    /// Where persistent state lives
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the last-device record
    pub data_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load from `path`, or from the default location when none is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::load_from_file(&path),
                _ => {
                    info!("Using default configuration");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading configuration from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.link
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;

        if self.radio.rfcomm_channel == 0 || self.radio.rfcomm_channel > 30 {
            return Err(CliError::Config(format!(
                "RFCOMM channel must be between 1 and 30, got {}",
                self.radio.rfcomm_channel
            )));
        }
        Ok(())
    }

    /// `linkport/linkport.toml` under the platform config directory
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Directory for persistent state
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join(APP_DIR)))
            .unwrap_or_else(|| PathBuf::from(".linkport"))
    }

    /// File holding the last connected device
    pub fn last_device_path(&self) -> PathBuf {
        self.data_dir().join(LAST_DEVICE_FILE)
    }
}
