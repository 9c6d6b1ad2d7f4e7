//! Command handlers for the linkport CLI

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use linkport_core::{
    Device, DeviceStore, EventReceiver, JsonFileDeviceStore, LinkEvent, LinkManager,
    PayloadFormat, ReconnectPolicy, TransportType,
};
use linkport_radio::PlatformRadio;

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// Time allowed for a write to reach the peer before `send` disconnects
const SEND_SETTLE: Duration = Duration::from_millis(500);

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Scan {
                seconds,
                named_only,
            } => Self::handle_scan_command(config, seconds, named_only).await,
            Commands::Connect {
                address,
                transport,
                hex,
                reconnect,
            } => Self::handle_connect_command(config, address, transport, hex, reconnect).await,
            Commands::Send {
                address,
                message,
                transport,
                hex,
            } => Self::handle_send_command(config, address, message, transport, hex).await,
            Commands::Monitor { interval } => Self::handle_monitor_command(config, interval).await,
            Commands::Status => Self::handle_status_command(config),
            Commands::Forget => Self::handle_forget_command(config),
        }
    }

    /// Handle the scan command
    async fn handle_scan_command(
        mut config: AppConfig,
        seconds: Option<u64>,
        named_only: bool,
    ) -> Result<()> {
        if let Some(seconds) = seconds {
            config.link.scan_duration_ms = seconds * 1000;
        }
        if named_only {
            config.link.ignore_unnamed_devices = true;
        }

        let manager = open_manager(&config).await?;
        let mut events = manager.subscribe();
        manager.start_discovery().await?;
        println!(
            "Scanning for {}s... Press Ctrl+C to stop",
            config.link.scan_duration().as_secs()
        );

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(LinkEvent::DiscoveryChanged { scanning: false }) => break,
                    Ok(LinkEvent::TransportDiscoveryChanged { transport, scanning }) => {
                        debug!("{} scan {}", transport, if scanning { "started" } else { "finished" });
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => warn!("Missed {} events", skipped),
                    Err(RecvError::Closed) => return Err(CliError::EventsClosed),
                },
                _ = tokio::signal::ctrl_c() => {
                    manager.stop_discovery().await;
                    break;
                }
            }
        }

        print_devices("Paired devices", &manager.paired_devices());
        print_devices("Available devices", &manager.unpaired_devices());

        manager.shutdown().await?;
        Ok(())
    }

    /// Handle the connect command, bridging the session to stdin/stdout
    async fn handle_connect_command(
        mut config: AppConfig,
        address: String,
        transport: TransportType,
        hex: bool,
        reconnect: bool,
    ) -> Result<()> {
        apply_format(&mut config, hex);
        config.link.reconnect.enabled = reconnect;

        let manager = open_manager(&config).await?;
        let mut events = manager.subscribe();
        manager.connect(&address, transport).await?;
        let device = await_connection(&mut events, &address).await?;
        println!("Connected to {}. Type to send, Ctrl+C to quit", device);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(LinkEvent::DataReceived { text, .. }) => println!("{}", text),
                    Ok(LinkEvent::ConnectionChanged { connected: true, device: Some(device) }) => {
                        println!("Reconnected to {}", device);
                    }
                    Ok(LinkEvent::ConnectionChanged { connected: false, device: Some(device) }) => {
                        println!("Disconnected from {}", device);
                        if !reconnect {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => warn!("Missed {} events", skipped),
                    Err(RecvError::Closed) => break,
                },
                line = lines.next_line(), if stdin_open => match line? {
                    Some(line) if line.is_empty() => {}
                    Some(line) => {
                        if let Err(e) = manager.send_text(&line).await {
                            warn!("Send failed: {}", e);
                        }
                    }
                    None => stdin_open = false,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        manager.shutdown().await?;
        Ok(())
    }

    /// Handle the send command
    async fn handle_send_command(
        mut config: AppConfig,
        address: String,
        message: String,
        transport: TransportType,
        hex: bool,
    ) -> Result<()> {
        apply_format(&mut config, hex);
        config.link.reconnect.enabled = false;

        let manager = open_manager(&config).await?;
        let mut events = manager.subscribe();
        manager.connect(&address, transport).await?;
        let device = await_connection(&mut events, &address).await?;

        manager.send_text(&message).await?;
        println!("Sent {} to {}", message, device);

        // Wait a moment for the write to reach the peer
        tokio::time::sleep(SEND_SETTLE).await;

        manager.shutdown().await?;
        Ok(())
    }

    /// Handle the monitor command
    async fn handle_monitor_command(mut config: AppConfig, interval: Option<u64>) -> Result<()> {
        let interval = interval.unwrap_or(config.link.reconnect.interval_ms);
        config.link.reconnect = ReconnectPolicy::every(interval);
        // Connect only after subscribing so the first outcome is printed
        config.link.auto_connect = false;

        let manager = open_manager(&config).await?;
        match manager.last_device()? {
            Some(last) => println!(
                "Monitoring {} over {} (retry every {}ms). Press Ctrl+C to stop",
                last.address, last.transport, interval
            ),
            None => {
                println!("No last device stored; connect to a device first");
                manager.shutdown().await?;
                return Ok(());
            }
        }

        let mut events = manager.subscribe();
        let outcome = manager.reconnect_now().await;
        debug!("Initial connect: {:?}", outcome);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => print_event(&event),
                    Err(RecvError::Lagged(skipped)) => warn!("Missed {} events", skipped),
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        manager.shutdown().await?;
        Ok(())
    }

    /// Handle the status command
    fn handle_status_command(config: AppConfig) -> Result<()> {
        let store = JsonFileDeviceStore::new(config.last_device_path());

        println!("linkport status");
        println!("===============");
        match store.load_last_device()? {
            Some(last) => println!("Last device:     {} ({})", last.address, last.transport),
            None => println!("Last device:     none"),
        }
        println!(
            "Reconnect:       {}",
            if config.link.reconnect.enabled {
                format!("every {}ms", config.link.reconnect.interval_ms)
            } else {
                "disabled".to_string()
            }
        );
        println!("Auto-connect:    {}", config.link.auto_connect);
        println!("Scan duration:   {}s", config.link.scan_duration().as_secs());
        println!("Legacy service:  {}", config.link.legacy_service_uuid);
        println!("Characteristic:  {}", config.link.attribute_characteristic_uuid);
        println!("Data directory:  {}", config.data_dir().display());
        Ok(())
    }

    /// Handle the forget command
    fn handle_forget_command(config: AppConfig) -> Result<()> {
        let store = JsonFileDeviceStore::new(config.last_device_path());
        store.clear_last_device()?;
        println!("Forgot last device");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

/// Build a link manager on the platform radio
async fn open_manager(config: &AppConfig) -> Result<LinkManager> {
    info!("Initializing radio...");
    let radio = PlatformRadio::new(config.radio.clone()).await?;
    if !radio.supports_legacy() {
        info!("Legacy transport unavailable, only attribute devices can be reached");
    }

    let store = JsonFileDeviceStore::new(config.last_device_path());
    let manager = LinkManager::builder()
        .config(config.link.clone())
        .build(radio, store)
        .await?;
    Ok(manager)
}

fn apply_format(config: &mut AppConfig, hex: bool) {
    if hex {
        config.link.send_format = PayloadFormat::Hex;
        config.link.read_format = PayloadFormat::Hex;
    }
}

/// Wait for the outcome of a connect attempt
async fn await_connection(events: &mut EventReceiver, address: &str) -> Result<Device> {
    loop {
        match events.recv().await {
            Ok(LinkEvent::ConnectionChanged {
                connected: true,
                device: Some(device),
            }) => return Ok(device),
            Ok(LinkEvent::ConnectionChanged {
                connected: false, ..
            }) => return Err(CliError::ConnectFailed(address.to_string())),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!("Missed {} events", skipped),
            Err(RecvError::Closed) => return Err(CliError::EventsClosed),
        }
    }
}

fn print_devices(title: &str, devices: &[Device]) {
    println!("{}:", title);
    if devices.is_empty() {
        println!("  (none)");
    }
    for device in devices {
        println!("  {} [{}]", device, device.transport);
    }
}

fn print_event(event: &LinkEvent) {
    match event {
        LinkEvent::ConnectionChanged {
            connected: true,
            device: Some(device),
        } => println!("Connected to {}", device),
        LinkEvent::ConnectionChanged {
            connected: false,
            device: Some(device),
        } => println!("Disconnected from {}", device),
        LinkEvent::ConnectionChanged { .. } => println!("Connect attempt failed, retrying"),
        LinkEvent::DataReceived { text, .. } => println!("{}", text),
        LinkEvent::Notice(notice) => debug!("{}", notice.message()),
        _ => {}
    }
}
