//! Change bus for vote-table notifications
//!
//! Pub/sub over a Tokio broadcast channel. Stores that can push changes
//! publish here; reconciliation controllers subscribe.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::ChangeNotice;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to ChangeBus
pub type SharedChangeBus = Arc<ChangeBus>;

/// Broadcast bus carrying [`ChangeNotice`]s
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<ChangeNotice>,
}

impl ChangeBus {
    /// Create a new change bus
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this bus
    pub fn shared(self) -> SharedChangeBus {
        Arc::new(self)
    }

    /// Publish a notice to all subscribers, returning how many received it
    pub fn publish(&self, notice: ChangeNotice) -> usize {
        let event_type = notice.event_type();
        match self.sender.send(notice) {
            Ok(count) => {
                debug!(event_type, receivers = count, "Change notice published");
                count
            }
            Err(_) => {
                // No receivers is OK
                debug!(event_type, "Change notice published (no receivers)");
                0
            }
        }
    }

    /// Subscribe to receive notices
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if the bus has any subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
