//! Status change notification channel.
//!
//! Delivery follows tokio `broadcast` semantics: every subscriber sees every
//! change emitted after it subscribed, in emission order, unless it lags
//! behind the buffer. Emitting with no subscribers is not an error.

use tokio::sync::broadcast;

use crate::types::StatusChange;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct StatusEvents {
    sender: broadcast::Sender<StatusChange>,
}

impl Default for StatusEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.sender.subscribe()
    }

    pub fn emit(&self, change: StatusChange) {
        tracing::debug!(
            project_id = %change.project_id,
            from = %change.previous_status,
            to = %change.new_status,
            "Project status changed"
        );
        // Err only means nobody is listening.
        let _ = self.sender.send(change);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
