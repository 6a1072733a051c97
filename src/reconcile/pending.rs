use crate::core::TicketId;
use crate::ticket::TrackedEntity;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Entity tickets waiting for their entity during a space load.
///
/// The host receives this while loading regions and reports every entity it
/// brings up through [`PendingEntities::entity_loaded`].
#[derive(Default)]
pub struct PendingEntities {
    waiting: HashMap<Uuid, TicketId>,
    bound: HashMap<TicketId, Arc<dyn TrackedEntity>>,
}

impl PendingEntities {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn expect(&mut self, persistent_id: Uuid, ticket: TicketId) {
        self.waiting.insert(persistent_id, ticket);
    }

    pub fn is_waiting_for(&self, persistent_id: &Uuid) -> bool {
        self.waiting.contains_key(persistent_id)
    }

    /// Binds the entity to the ticket waiting for it. Returns false when no
    /// ticket was waiting for this entity.
    pub fn entity_loaded(&mut self, entity: Arc<dyn TrackedEntity>) -> bool {
        match self.waiting.remove(&entity.persistent_id()) {
            Some(ticket) => {
                self.bound.insert(ticket, entity);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_bound(&self, ticket: TicketId) -> bool {
        self.bound.contains_key(&ticket)
    }

    pub(crate) fn take_bound(&mut self, ticket: TicketId) -> Option<Arc<dyn TrackedEntity>> {
        self.bound.remove(&ticket)
    }

    /// Persistent ids that never showed up.
    pub(crate) fn unresolved(&self) -> impl Iterator<Item = (&Uuid, &TicketId)> {
        self.waiting.iter()
    }
}
