//! Error handling for the linkport CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Link error: {0}")]
    Link(#[from] linkport_core::LinkError),

    #[error("Storage error: {0}")]
    Storage(#[from] linkport_core::StorageError),

    #[error("Radio backend error: {0}")]
    Radio(#[from] linkport_radio::RadioBackendError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection to {0} failed")]
    ConnectFailed(String),

    #[error("Event stream closed")]
    EventsClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
