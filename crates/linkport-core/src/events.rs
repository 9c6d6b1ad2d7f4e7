//! Observer event bus
//!
//! Every state change is published on a broadcast channel. Each subscriber
//! receives events in the order they were emitted; emitting never blocks and
//! never fails the caller.

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::device::{Device, TransportType};

// ----------------------------------------------------------------------------
// Event Types
// ----------------------------------------------------------------------------

/// User-facing notices, the toast sink of the link manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    ConnectSucceeded,
    ConnectFailed,
    Disconnected,
    /// A connect was requested while a session is active or being opened
    DisconnectFirst,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Notice::ConnectSucceeded => "Connected",
            Notice::ConnectFailed => "Connection failed",
            Notice::Disconnected => "Disconnected",
            Notice::DisconnectFirst => "Already connected, disconnect first",
        }
    }
}

/// Events published to observers
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Connection status changed
    ///
    /// A failed attempt reports `connected: false` with no device; a dropped
    /// session reports `connected: false` with the device that was connected.
    ConnectionChanged {
        connected: bool,
        device: Option<Device>,
    },
    /// Unified discovery session started or stopped
    DiscoveryChanged { scanning: bool },
    /// A single transport's scan started or stopped
    TransportDiscoveryChanged {
        transport: TransportType,
        scanning: bool,
    },
    /// Payload received from the connected peer
    DataReceived {
        device: Device,
        payload: Vec<u8>,
        /// Payload rendered with the configured read format
        text: String,
    },
    Notice(Notice),
}

/// Receiving end handed to observers
pub type EventReceiver = broadcast::Receiver<LinkEvent>;

// ----------------------------------------------------------------------------
// Event Bus
// ----------------------------------------------------------------------------

/// Multi-subscriber event bus
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LinkEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per lagging subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a new observer
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Publish an event to all current observers
    pub fn emit(&self, event: LinkEvent) {
        if self.sender.send(event).is_err() {
            debug!("Event dropped: no subscribers");
        }
    }

    /// Publish a user-facing notice
    pub fn notify(&self, notice: Notice) {
        info!("{}", notice.message());
        self.emit(LinkEvent::Notice(notice));
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_see_events_in_emission_order() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(LinkEvent::DiscoveryChanged { scanning: true });
        bus.notify(Notice::ConnectFailed);

        for rx in [&mut first, &mut second] {
            assert_eq!(
                rx.try_recv().unwrap(),
                LinkEvent::DiscoveryChanged { scanning: true }
            );
            assert_eq!(
                rx.try_recv().unwrap(),
                LinkEvent::Notice(Notice::ConnectFailed)
            );
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = EventBus::new(1);
        assert_eq!(bus.subscriber_count(), 0);
        bus.notify(Notice::Disconnected);
    }
}
