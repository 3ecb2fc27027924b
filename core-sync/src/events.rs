//! Sync lifecycle events over a broadcast bus.
//!
//! Subscribers (tray icon, notification daemon) observe cycles without
//! coupling to the engine; an event dropped because nobody listens is not
//! an error.

use tokio::sync::broadcast;

const DEFAULT_EVENT_BUFFER_SIZE: usize = 64;

/// One observable moment in a sync cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A cycle began for an account.
    Started { account_id: i64 },
    /// One entity failed during the cycle; the cycle continued.
    EntityFailed {
        account_id: i64,
        entity: String,
        message: String,
    },
    /// A record newly assigned to the account's user appeared.
    NewAssignment {
        account_id: i64,
        entity: String,
        remote_id: i64,
        title: String,
    },
    /// The cycle finished. `success` is false when any phase failed.
    Completed { account_id: i64, success: bool },
}

/// Broadcast fan-out for [`SyncEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all subscribers. A cycle with no listeners is normal;
    /// the send error is swallowed.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }

    /// Independent receiver for all future events. Past events are not
    /// replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}
