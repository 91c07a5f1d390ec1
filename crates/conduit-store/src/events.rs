use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use conduit_types::Locator;

use crate::object::StoredObject;

/// Default capacity of the write-event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Notification that an object has been durably written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobWritten {
    pub container: String,
    pub name: String,
    pub locator: Locator,
    pub size: u64,
    pub content_type: String,
}

impl From<&StoredObject> for BlobWritten {
    fn from(object: &StoredObject) -> Self {
        Self {
            container: object.container.clone(),
            name: object.name.clone(),
            locator: object.locator.clone(),
            size: object.size,
            content_type: object.content_type.clone(),
        }
    }
}

/// A broadcast channel receiver for write events.
pub type WriteEvents = broadcast::Receiver<BlobWritten>;

/// Fan-out of write events to every subscriber.
///
/// Slow subscribers lag rather than block writers; a lagging receiver sees
/// `RecvError::Lagged` with the number of events it missed.
#[derive(Debug)]
pub struct WriteNotifier {
    sender: broadcast::Sender<BlobWritten>,
}

impl WriteNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> WriteEvents {
        self.sender.subscribe()
    }

    /// Broadcast a write. Returns the number of subscribers reached.
    pub fn notify(&self, object: &StoredObject) -> usize {
        match self.sender.send(BlobWritten::from(object)) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(name = %object.name, "no write subscribers");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for WriteNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
