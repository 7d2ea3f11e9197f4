use crate::types::StatusReport;
use serde::Serialize;
use tokio::sync::broadcast;

/// Outward notifications published by the core.
///
/// Delivery is best-effort: subscribers may lag, drop messages, or be absent
/// entirely, and the core never waits on them.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreEvent {
    StatusChanged { status: StatusReport },
    LatchExpired,
    ServiceDown,
    ServiceUp,
}

/// Fan-out channel between the core and whatever front end is listening.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: CoreEvent) {
        // No receivers is fine; the core must not assume delivery.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }
}
