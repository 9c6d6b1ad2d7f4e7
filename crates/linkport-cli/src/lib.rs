//! linkport CLI library
//!
//! Command-line parsing, file configuration and command handlers for the
//! `linkport` serial terminal.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::AppConfig;
pub use error::{CliError, Result};
