//! Delivery of hardware callbacks to the link manager

use std::sync::{Arc, OnceLock};

use linkport_core::{RadioError, RadioEvent, RadioEventSender};
use tracing::debug;

/// Shared handle to the attached callback channel
///
/// Background tasks are started before the link manager attaches its
/// channel; events raised before that are dropped.
#[derive(Clone, Default)]
pub(crate) struct EventSink {
    sender: Arc<OnceLock<RadioEventSender>>,
}

impl EventSink {
    pub(crate) fn attach(&self, sender: RadioEventSender) -> Result<(), RadioError> {
        self.sender
            .set(sender)
            .map_err(|_| RadioError::EventsAlreadyAttached)
    }

    pub(crate) fn send(&self, event: RadioEvent) {
        match self.sender.get() {
            Some(sender) => {
                if sender.send(event).is_err() {
                    debug!("Radio event dropped: link manager stopped");
                }
            }
            None => debug!("Radio event dropped: no listener attached"),
        }
    }
}
