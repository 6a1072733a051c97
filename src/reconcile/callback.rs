use crate::core::{OwnerId, SpaceId, TicketId};
use crate::facade::ForceManager;
use crate::ticket::Ticket;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Mandatory per-owner hook, called when a space is loaded with the owner's
/// surviving tickets. This is where owners re-derive runtime state from the
/// ticket payload and force regions again if they want different ones.
pub trait LoadingCallback: Send + Sync {
    /// Called with the committed tickets, always, even when empty selections
    /// were made by the ordering hooks.
    fn tickets_loaded(&self, tickets: &[TicketId], space: SpaceId, manager: &mut ForceManager);

    /// Optional capability: choose and order tickets before truncation.
    fn ordered(&self) -> Option<&dyn OrderedLoadingCallback> {
        None
    }

    /// Optional capability: choose player-bound tickets per player.
    fn player_ordered(&self) -> Option<&dyn PlayerOrderedLoadingCallback> {
        None
    }
}

pub trait OrderedLoadingCallback {
    /// Returns the ids to keep, best first. The result is truncated to
    /// `max_count`; unknown and repeated ids are ignored. Forcing is not
    /// possible from here, the tickets are not registered yet.
    fn ordered_tickets_loaded(&self, tickets: &[&Ticket], space: SpaceId, max_count: u32) -> Vec<TicketId>;
}

pub trait PlayerOrderedLoadingCallback {
    /// Returns, per player, the ids to keep.
    fn player_tickets_loaded(
        &self,
        tickets: &BTreeMap<String, Vec<&Ticket>>,
        space: SpaceId,
    ) -> BTreeMap<String, Vec<TicketId>>;
}

#[derive(Default, Clone)]
pub struct CallbackRegistry {
    callbacks: HashMap<OwnerId, Arc<dyn LoadingCallback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, owner: OwnerId, callback: Arc<dyn LoadingCallback>) {
        self.callbacks.insert(owner, callback);
    }

    pub fn get(&self, owner: &str) -> Option<Arc<dyn LoadingCallback>> {
        self.callbacks.get(owner).cloned()
    }

    pub fn contains(&self, owner: &str) -> bool {
        self.callbacks.contains_key(owner)
    }
}
