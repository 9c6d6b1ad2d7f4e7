//! Periodic reconnection to the last known device

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ReconnectPolicy;
use crate::coordinator::{ConnectOrigin, ConnectionCoordinator};
use crate::device::LastDevice;
use crate::storage::DeviceStore;

/// What a single reconnect tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// The policy is disabled
    Disabled,
    /// A session is active or an attempt is already running
    Busy,
    /// Nothing has been stored to reconnect to
    NoLastDevice,
    /// A connect attempt to the stored device was started
    Attempted(LastDevice),
}

struct SchedulerShared {
    coordinator: ConnectionCoordinator,
    store: Arc<dyn DeviceStore>,
    policy: Mutex<ReconnectPolicy>,
}

impl SchedulerShared {
    fn policy(&self) -> ReconnectPolicy {
        *self.policy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn tick(&self) -> ReconnectOutcome {
        if !self.policy().enabled {
            return ReconnectOutcome::Disabled;
        }
        if !self.coordinator.phase().await.is_idle() {
            return ReconnectOutcome::Busy;
        }

        let last = match self.store.load_last_device() {
            Ok(Some(last)) => last,
            Ok(None) => return ReconnectOutcome::NoLastDevice,
            Err(e) => {
                warn!("Failed to load last device: {}", e);
                return ReconnectOutcome::NoLastDevice;
            }
        };

        // The coordinator's connect gate is the only admission control; a
        // user connect slipping in between the phase read and here wins.
        match self
            .coordinator
            .begin_connect(&last.address, last.transport, ConnectOrigin::Reconnect)
            .await
        {
            Ok(()) => {
                debug!("Reconnecting to {}", last.address);
                ReconnectOutcome::Attempted(last)
            }
            Err(e) if e.is_busy() => ReconnectOutcome::Busy,
            Err(e) => {
                warn!("Reconnect to {} not started: {}", last.address, e);
                ReconnectOutcome::Busy
            }
        }
    }
}

/// Timer re-attempting the last device while disconnected
///
/// Retries forever at the policy interval. Disarming cancels pending ticks
/// only; an attempt already handed to the coordinator runs to completion.
pub struct ReconnectScheduler {
    shared: Arc<SchedulerShared>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectScheduler {
    pub(crate) fn new(coordinator: ConnectionCoordinator, store: Arc<dyn DeviceStore>) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                coordinator,
                store,
                policy: Mutex::new(ReconnectPolicy::disabled()),
            }),
            ticker: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.shared.policy()
    }

    /// Install `policy`, replacing any armed timer
    pub fn apply(&self, policy: ReconnectPolicy) {
        *self
            .shared
            .policy
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = policy;

        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = ticker.take() {
            previous.abort();
        }

        if !policy.enabled {
            debug!("Reconnect timer disarmed");
            return;
        }

        let period = policy.interval();
        let shared = self.shared.clone();
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let outcome = shared.tick().await;
                debug!("Reconnect tick: {:?}", outcome);
            }
        }));
        info!("Reconnect timer armed every {}ms", policy.interval_ms);
    }

    /// Stop ticking without touching the stored policy's interval
    pub fn disarm(&self) {
        let mut policy = self.policy();
        policy.enabled = false;
        self.apply(policy);
    }

    pub fn is_armed(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Run one tick immediately
    pub async fn reconnect_once(&self) -> ReconnectOutcome {
        self.shared.tick().await
    }
}

impl Drop for ReconnectScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self
            .ticker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
