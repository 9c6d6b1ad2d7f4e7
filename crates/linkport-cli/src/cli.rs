//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use linkport_core::TransportType;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Data directory for the last-device record
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan both transports and list paired and unpaired devices
    Scan {
        /// Scan length in seconds
        #[arg(short, long)]
        seconds: Option<u64>,
        /// Hide devices that advertise no name
        #[arg(long)]
        named_only: bool,
    },
    /// Open a session and bridge it to stdin/stdout
    Connect {
        /// Hardware address of the peer
        address: String,
        /// Transport to connect over (legacy or attribute)
        #[arg(short, long, default_value = "legacy")]
        transport: TransportType,
        /// Treat input and output as hex digits
        #[arg(long)]
        hex: bool,
        /// Keep reconnecting to the peer after the session drops
        #[arg(short, long)]
        reconnect: bool,
    },
    /// Connect, send a single payload and exit
    Send {
        /// Hardware address of the peer
        address: String,
        /// Payload to send
        message: String,
        /// Transport to connect over (legacy or attribute)
        #[arg(short, long, default_value = "legacy")]
        transport: TransportType,
        /// Interpret the payload as hex digits
        #[arg(long)]
        hex: bool,
    },
    /// Reconnect to the last device and print everything it sends
    Monitor {
        /// Reconnect interval in milliseconds
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Show the stored last device and effective configuration
    Status,
    /// Forget the stored last device
    Forget,
}
