//! Discovery aggregation across both transports
//!
//! Both transport scans are started and stopped together so observers see
//! one discovery session. Found devices are kept per transport in paired and
//! unpaired buckets keyed by address, and exposed as union views.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::device::{Device, TransportType};
use crate::error::{LinkError, LinkResult};
use crate::events::{EventBus, LinkEvent};
use crate::radio::Radio;

// ----------------------------------------------------------------------------
// Discovery Lists
// ----------------------------------------------------------------------------

type Bucket = HashMap<String, Device>;

/// Paired and unpaired devices, per transport
#[derive(Debug, Clone, Default)]
pub struct DiscoveryLists {
    paired: HashMap<TransportType, Bucket>,
    unpaired: HashMap<TransportType, Bucket>,
}

impl DiscoveryLists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `device` in the bucket its bond state selects
    pub fn upsert(&mut self, device: Device, bonded: bool) {
        let (target, other) = if bonded {
            (&mut self.paired, &mut self.unpaired)
        } else {
            (&mut self.unpaired, &mut self.paired)
        };

        if let Some(bucket) = other.get_mut(&device.transport) {
            bucket.remove(&device.address);
        }
        target
            .entry(device.transport)
            .or_default()
            .insert(device.address.clone(), device);
    }

    pub fn clear_unpaired(&mut self) {
        self.unpaired.clear();
    }

    pub fn paired(&self) -> Vec<Device> {
        union(&self.paired)
    }

    pub fn unpaired(&self) -> Vec<Device> {
        union(&self.unpaired)
    }

    pub fn len(&self) -> usize {
        count(&self.paired) + count(&self.unpaired)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn union(buckets: &HashMap<TransportType, Bucket>) -> Vec<Device> {
    let mut devices: Vec<Device> = buckets.values().flat_map(|b| b.values().cloned()).collect();
    devices.sort_by(|a, b| {
        a.address
            .cmp(&b.address)
            .then(a.transport.code().cmp(&b.transport.code()))
    });
    devices
}

fn count(buckets: &HashMap<TransportType, Bucket>) -> usize {
    buckets.values().map(HashMap::len).sum()
}

// ----------------------------------------------------------------------------
// Discovery Aggregator
// ----------------------------------------------------------------------------

#[derive(Default)]
struct DiscoveryState {
    lists: DiscoveryLists,
    active: HashSet<TransportType>,
    scanning: bool,
}

struct DiscoveryInner {
    state: Mutex<DiscoveryState>,
    radio: Arc<dyn Radio>,
    events: EventBus,
    ignore_unnamed: bool,
    scan_duration: Duration,
    stop_timer: Mutex<Option<JoinHandle<()>>>,
}

/// Collects found devices and republishes scan state as one signal
#[derive(Clone)]
pub struct DiscoveryAggregator {
    inner: Arc<DiscoveryInner>,
}

impl DiscoveryAggregator {
    pub(crate) fn new(
        radio: Arc<dyn Radio>,
        events: EventBus,
        ignore_unnamed: bool,
        scan_duration: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(DiscoveryInner {
                state: Mutex::new(DiscoveryState::default()),
                radio,
                events,
                ignore_unnamed,
                scan_duration,
                stop_timer: Mutex::new(None),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, DiscoveryState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_scanning(&self) -> bool {
        self.state().scanning
    }

    pub fn paired_devices(&self) -> Vec<Device> {
        self.state().lists.paired()
    }

    pub fn unpaired_devices(&self) -> Vec<Device> {
        self.state().lists.unpaired()
    }

    // ------------------------------------------------------------------------
    // Scan Control
    // ------------------------------------------------------------------------

    /// Start scanning on both transports
    ///
    /// A transport that cannot scan is logged and skipped; an error is
    /// returned only when neither transport started. Both scans are stopped
    /// once the scan duration elapses.
    pub async fn start(&self) -> LinkResult<()> {
        let mut started = 0;
        let mut last_error = None;

        for transport in TransportType::ALL {
            match self.inner.radio.start_scan(transport).await {
                Ok(()) => started += 1,
                Err(e) => {
                    warn!("Failed to start {} scan: {}", transport, e);
                    last_error = Some(e);
                }
            }
        }

        if started == 0 {
            if let Some(e) = last_error {
                return Err(LinkError::from(e));
            }
        }

        let aggregator = self.clone();
        let duration = self.inner.scan_duration;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            debug!("Scan window of {}ms elapsed", duration.as_millis());
            aggregator.stop_scans().await;
        });
        if let Some(previous) = self
            .inner
            .stop_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(timer)
        {
            previous.abort();
        }

        Ok(())
    }

    /// Stop scanning on both transports
    pub async fn stop(&self) {
        self.cancel_timer();
        self.stop_scans().await;
    }

    pub(crate) fn cancel_timer(&self) {
        if let Some(timer) = self
            .inner
            .stop_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            timer.abort();
        }
    }

    async fn stop_scans(&self) {
        for transport in TransportType::ALL {
            if let Err(e) = self.inner.radio.stop_scan(transport).await {
                warn!("Failed to stop {} scan: {}", transport, e);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Hardware Callbacks
    // ------------------------------------------------------------------------

    pub(crate) fn on_scan_started(&self, transport: TransportType) {
        let mut state = self.state();
        if !state.scanning {
            state.scanning = true;
            state.lists.clear_unpaired();
            info!("Discovery started");
            self.inner
                .events
                .emit(LinkEvent::DiscoveryChanged { scanning: true });
        }
        if state.active.insert(transport) {
            self.inner.events.emit(LinkEvent::TransportDiscoveryChanged {
                transport,
                scanning: true,
            });
        }
    }

    pub(crate) fn on_device_found(&self, device: Device, bonded: bool) {
        if self.inner.ignore_unnamed && !device.has_name() {
            debug!("Ignoring unnamed device {}", device.address);
            return;
        }
        debug!(
            "Found {} device {} ({})",
            if bonded { "paired" } else { "unpaired" },
            device,
            device.transport
        );
        self.state().lists.upsert(device, bonded);
    }

    pub(crate) async fn on_scan_finished(&self, transport: TransportType) {
        let others: Vec<TransportType> = {
            let mut state = self.state();
            if state.active.remove(&transport) {
                self.inner.events.emit(LinkEvent::TransportDiscoveryChanged {
                    transport,
                    scanning: false,
                });
            }
            if !state.scanning {
                return;
            }
            state.scanning = false;
            info!("Discovery finished");
            self.inner
                .events
                .emit(LinkEvent::DiscoveryChanged { scanning: false });
            state.active.iter().copied().collect()
        };

        // Stop the other transport in tandem
        for other in others {
            if let Err(e) = self.inner.radio.stop_scan(other).await {
                warn!("Failed to stop {} scan: {}", other, e);
            }
        }
    }
}
