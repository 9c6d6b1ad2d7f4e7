//! linkport - serial terminal for Bluetooth devices

use clap::Parser;
use tracing::{error, info};

use linkport_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig, error::Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    // Load configuration
    let mut config = AppConfig::load(cli.config.as_deref())?;

    // Override data directory if specified
    if let Some(data_dir) = &cli.data_dir {
        config.storage.data_dir = Some(data_dir.clone());
    }

    if let Err(e) = CommandDispatcher::execute(cli, config).await {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    info!("linkport exited");
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
