use crate::core::{OwnerId, RegionCoord, SpaceId, TicketId};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceEventKind {
    Forced,
    Unforced,
}

/// Notification that a ticket started or stopped forcing a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceEvent {
    pub kind: ForceEventKind,
    pub space: SpaceId,
    pub ticket: TicketId,
    pub owner: OwnerId,
    pub region: RegionCoord,
}

/// Receives force/unforce notifications. Bulk restores during reconciliation
/// do not publish.
pub trait ForceEventSink: Send + Sync {
    fn publish(&self, event: ForceEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl ForceEventSink for NoopEventSink {
    fn publish(&self, _event: ForceEvent) {}
}

/// Fans events out over a tokio broadcast channel.
///
/// Publishing never blocks; with no subscribers the event is discarded, and
/// slow subscribers observe `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<ForceEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ForceEvent> {
        self.sender.subscribe()
    }
}

impl ForceEventSink for BroadcastEventSink {
    fn publish(&self, event: ForceEvent) {
        // Err only means nobody is listening right now.
        let _ = self.sender.send(event);
    }
}
