//! Change feed for the receipt store.
//!
//! Publish/subscribe over `tokio::sync::broadcast`. Sending and `try_recv`
//! are synchronous, so no runtime is needed. Subscribers that fall more than
//! `capacity` events behind get `TryRecvError::Lagged` and should re-read the
//! store snapshot.

use tokio::sync::broadcast;
use tracing::trace;

/// Something changed in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// Collection (re)loaded from the persisted slot
    Loaded { count: usize },
    Added { id: String },
    /// Batch append
    Imported { count: usize },
    Updated { id: String },
    /// Every record with `id` was removed; `removed` may be 0
    Deleted { id: String, removed: usize },
    Cleared { removed: usize },
    /// In-memory state changed but the slot write failed
    PersistFailed { reason: String },
}

#[derive(Debug)]
pub struct ChangeFeed {
    sender: broadcast::Sender<StoreEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Events published with no subscribers are dropped.
    pub fn publish(&self, event: StoreEvent) {
        match self.sender.send(event) {
            Ok(n) => trace!(subscribers = n, "store event published"),
            Err(_) => trace!("store event published without subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
