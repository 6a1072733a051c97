use super::SpaceHost;
use crate::cache::{DormantCache, DormantPayload, StoredRegion};
use crate::config::{QuotaConfig, QuotaTable};
use crate::core::{ForceError, OwnerId, RegionCoord, Result, SpaceId, TicketId, TicketKind};
use crate::events::{ForceEventSink, NoopEventSink};
use crate::index::ForcedSnapshot;
use crate::reconcile::{CallbackRegistry, LoadingCallback, ReconciliationEngine};
use crate::registry::{PlayerPool, SpaceTickets};
use crate::storage::{ForcedRegionsStore, PersistedTickets, codec};
use crate::ticket::{Ticket, TicketPayload, TrackedEntity};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Entry point for owners and for the host.
///
/// Owners request tickets and force regions through it; the host drives the
/// space lifecycle (`load_space`, `save_space`, `unload_space`, `shutdown`).
/// All state is mutated through `&mut self` from the host's control thread.
pub struct ForceManager {
    quotas: QuotaTable,
    callbacks: CallbackRegistry,
    spaces: HashMap<SpaceId, SpaceTickets>,
    /// Where every live ticket is registered.
    locations: HashMap<TicketId, SpaceId>,
    players: PlayerPool,
    /// Recently released regions per loaded space.
    dormant: HashMap<SpaceId, DormantCache<StoredRegion>>,
    sink: Arc<dyn ForceEventSink>,
    warned_owners: HashSet<OwnerId>,
}

impl ForceManager {
    pub fn new(config: QuotaConfig) -> Self {
        Self {
            quotas: QuotaTable::new(config),
            callbacks: CallbackRegistry::new(),
            spaces: HashMap::new(),
            locations: HashMap::new(),
            players: PlayerPool::new(),
            dormant: HashMap::new(),
            sink: Arc::new(NoopEventSink),
            warned_owners: HashSet::new(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn ForceEventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Registers the owner's loading callback. Owners cannot request tickets
    /// before doing this.
    pub fn set_loading_callback(
        &mut self,
        owner: impl Into<OwnerId>,
        callback: Arc<dyn LoadingCallback>,
    ) -> Result<()> {
        let owner = owner.into();
        if owner.is_reserved() {
            return Err(ForceError::UnregisteredOwner(format!(
                "{} is reserved for player tickets",
                owner
            )));
        }
        debug!(owner = %owner, "loading callback registered");
        self.callbacks.register(owner, callback);
        Ok(())
    }

    pub fn quotas(&self) -> &QuotaTable {
        &self.quotas
    }

    /// Swaps in a new quota configuration. Live tickets keep their depth.
    pub fn refresh_quotas(&mut self, config: QuotaConfig) {
        self.quotas.refresh(config);
        self.warned_owners.clear();
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    pub fn request_ticket(&mut self, owner: &str, space: SpaceId, kind: TicketKind) -> Result<TicketId> {
        let owner = self.registered_owner(owner)?;
        let max = self.quotas.max_tickets(owner.as_str());
        let registry = self.spaces.get_mut(&space).ok_or(ForceError::UnknownSpace(space.0))?;

        if registry.owner_count(owner.as_str()) >= max as usize {
            if self.warned_owners.insert(owner.clone()) {
                info!(
                    owner = %owner,
                    max,
                    "owner has used all of its allocated region forcing tickets"
                );
            }
            return Err(ForceError::QuotaExhausted {
                owner: owner.to_string(),
                max,
            });
        }

        let depth = self.quotas.max_regions_per_ticket(owner.as_str());
        let id = registry.insert(Ticket::new(owner, kind, space, depth));
        self.locations.insert(id, space);
        Ok(id)
    }

    /// Requests a ticket counted against `player` instead of the owner.
    pub fn request_player_ticket(
        &mut self,
        owner: &str,
        player: &str,
        space: SpaceId,
        kind: TicketKind,
    ) -> Result<TicketId> {
        let owner = self.registered_owner(owner)?;
        let max = self.quotas.player_ticket_count();
        let registry = self.spaces.get_mut(&space).ok_or(ForceError::UnknownSpace(space.0))?;

        if self.players.count(player) >= max as usize {
            warn!(player, max, "player has used all of its region forcing tickets");
            return Err(ForceError::PlayerQuotaExhausted {
                player: player.to_string(),
                max,
            });
        }

        let depth = self.quotas.max_regions_per_ticket(owner.as_str());
        let id = registry.insert(Ticket::for_player(owner, player.to_string(), kind, space, depth));
        self.players.add(player, space, id);
        self.locations.insert(id, space);
        Ok(id)
    }

    /// Unforces everything the ticket holds and drops it. Releasing an
    /// unknown or already released ticket does nothing.
    pub fn release_ticket(&mut self, id: TicketId) {
        let Some(space) = self.locations.remove(&id) else {
            return;
        };
        let Some(registry) = self.spaces.get_mut(&space) else {
            return;
        };
        if let Some(ticket) = registry.remove(id, self.sink.as_ref())
            && let Some(player) = ticket.player()
        {
            self.players.remove(player, id);
        }
    }

    // ------------------------------------------------------------------
    // Ticket operations
    // ------------------------------------------------------------------

    pub fn force_region(&mut self, id: TicketId, coord: RegionCoord) -> Result<()> {
        let registry = Self::registry_of(&mut self.spaces, &self.locations, id)?;
        registry.force(id, coord, self.sink.as_ref())
    }

    pub fn unforce_region(&mut self, id: TicketId, coord: RegionCoord) -> Result<()> {
        let registry = Self::registry_of(&mut self.spaces, &self.locations, id)?;
        registry.unforce(id, &coord, self.sink.as_ref())
    }

    /// Moves `coord` to the young end of the ticket's forced set, so it is
    /// evicted last.
    pub fn reorder_region(&mut self, id: TicketId, coord: RegionCoord) -> Result<()> {
        let registry = Self::registry_of(&mut self.spaces, &self.locations, id)?;
        registry.reorder(id, &coord)
    }

    /// Returns whether the new depth was accepted.
    pub fn set_ticket_depth(&mut self, id: TicketId, depth: u32) -> Result<bool> {
        let max = self.max_depth(id)?;
        let registry = Self::registry_of(&mut self.spaces, &self.locations, id)?;
        registry.set_depth(id, depth, max, self.sink.as_ref())
    }

    /// Owner's current per-ticket region quota for this ticket.
    pub fn max_depth(&self, id: TicketId) -> Result<u32> {
        let ticket = self.ticket(id).ok_or_else(|| released(id))?;
        Ok(self.quotas.max_regions_per_ticket(ticket.owner().as_str()))
    }

    pub fn bind_entity(&mut self, id: TicketId, entity: Arc<dyn TrackedEntity>) -> Result<()> {
        let registry = Self::registry_of(&mut self.spaces, &self.locations, id)?;
        registry.bind(id, entity).inspect_err(|err| {
            warn!(ticket = %id, error = %err, "entity binding rejected");
        })
    }

    pub fn ticket(&self, id: TicketId) -> Option<&Ticket> {
        let space = self.locations.get(&id)?;
        self.spaces.get(space)?.get(id)
    }

    pub fn ticket_payload_mut(&mut self, id: TicketId) -> Option<&mut TicketPayload> {
        let space = self.locations.get(&id)?;
        let ticket = self.spaces.get_mut(space)?.get_mut(id)?;
        Some(ticket.payload_mut())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn current_count(&self, owner: &str, space: SpaceId) -> usize {
        self.spaces.get(&space).map_or(0, |r| r.owner_count(owner))
    }

    pub fn available_tickets(&self, owner: &str, space: SpaceId) -> u32 {
        let used = u32::try_from(self.current_count(owner, space)).unwrap_or(u32::MAX);
        self.quotas.max_tickets(owner).saturating_sub(used)
    }

    pub fn available_player_tickets(&self, player: &str) -> u32 {
        let used = u32::try_from(self.players.count(player)).unwrap_or(u32::MAX);
        self.quotas.player_ticket_count().saturating_sub(used)
    }

    /// Tickets filed under `holder` in `space`, in request order.
    pub fn tickets_for(&self, holder: &str, space: SpaceId) -> Vec<TicketId> {
        self.spaces.get(&space).map(|r| r.tickets_of(holder)).unwrap_or_default()
    }

    /// Current forced region view of a space.
    pub fn persistent_regions_for(&self, space: SpaceId) -> Option<ForcedSnapshot> {
        self.spaces.get(&space).map(SpaceTickets::snapshot)
    }

    pub fn is_space_loaded(&self, space: SpaceId) -> bool {
        self.spaces.contains_key(&space)
    }

    // ------------------------------------------------------------------
    // Space lifecycle
    // ------------------------------------------------------------------

    /// Registers an empty space. Used for spaces that have nothing on disk.
    pub fn open_space(&mut self, space: SpaceId) {
        self.spaces.entry(space).or_insert_with(|| SpaceTickets::new(space));
        let capacity = self.quotas.dormant_cache_size() as usize;
        self.dormant.entry(space).or_insert_with(|| DormantCache::new(capacity));
    }

    /// Loads the space's persisted tickets, reconciles them with their
    /// owners and commits the survivors. Returns the number of committed
    /// tickets.
    pub fn load_space(&mut self, space: SpaceId, host: &mut dyn SpaceHost) -> usize {
        let persisted = host
            .save_location(space)
            .and_then(|dir| ForcedRegionsStore::new(dir).load());
        self.restore_space(space, persisted, host)
    }

    /// Same as [`load_space`](Self::load_space) for an already decoded set.
    pub fn restore_space(
        &mut self,
        space: SpaceId,
        persisted: Option<PersistedTickets>,
        host: &mut dyn SpaceHost,
    ) -> usize {
        if self.spaces.contains_key(&space) {
            warn!(space = %space, "space is already loaded, persisted tickets ignored");
            return 0;
        }
        self.open_space(space);

        let Some(persisted) = persisted.filter(|p| !p.is_empty()) else {
            return 0;
        };

        let reconciled =
            ReconciliationEngine::new(space, &self.quotas, &self.callbacks, &self.players).run(persisted, host);
        let committed = reconciled.ticket_count();

        let mut notifications: Vec<(OwnerId, Vec<TicketId>)> = Vec::new();
        {
            let Some(registry) = self.spaces.get_mut(&space) else {
                return 0;
            };
            for group in reconciled.owners {
                let ids = registry.restore(group.tickets);
                for id in &ids {
                    self.locations.insert(*id, space);
                }
                notifications.push((group.owner, ids));
            }
            for group in reconciled.players {
                let mut ids = Vec::new();
                for (player, tickets) in group.by_player {
                    for id in registry.restore(tickets) {
                        self.players.add(&player, space, id);
                        self.locations.insert(id, space);
                        ids.push(id);
                    }
                }
                notifications.push((group.owner, ids));
            }
        }

        info!(space = %space, tickets = committed, "restored region forcing tickets");

        for (owner, ids) in notifications {
            match self.callbacks.get(owner.as_str()) {
                Some(callback) => callback.tickets_loaded(&ids, space, self),
                None => error!(owner = %owner, "loading callback disappeared during reconciliation"),
            }
        }
        committed
    }

    /// Persisted form of the space's live tickets.
    pub fn snapshot_space(&self, space: SpaceId) -> Result<PersistedTickets> {
        let registry = self.spaces.get(&space).ok_or(ForceError::UnknownSpace(space.0))?;
        Ok(codec::snapshot(registry))
    }

    /// Writes the space's tickets to its save location. Spaces without a
    /// save location are skipped.
    pub fn save_space(&self, space: SpaceId, host: &dyn SpaceHost) -> Result<()> {
        let snapshot = self.snapshot_space(space)?;
        let Some(dir) = host.save_location(space) else {
            debug!(space = %space, "space has no save location, tickets not persisted");
            return Ok(());
        };
        ForcedRegionsStore::new(dir).save(&snapshot)
    }

    /// Forgets every ticket of the space without emitting events. The host
    /// saves first if it wants the tickets back.
    pub fn unload_space(&mut self, space: SpaceId) -> bool {
        let Some(registry) = self.spaces.remove(&space) else {
            return false;
        };
        self.locations.retain(|_, s| *s != space);
        self.players.remove_space(space);
        self.dormant.remove(&space);
        debug!(space = %space, tickets = registry.ticket_count(), "space unloaded");
        true
    }

    /// Drops every space and the player pool.
    pub fn shutdown(&mut self) {
        self.spaces.clear();
        self.locations.clear();
        self.players.clear();
        self.dormant.clear();
        self.warned_owners.clear();
    }

    // ------------------------------------------------------------------
    // Dormant regions
    // ------------------------------------------------------------------

    /// Keeps a released region's data around in the space's cache. Returns
    /// false when the space is not loaded or its cache is disabled.
    pub fn put_dormant<P>(&mut self, space: SpaceId, coord: RegionCoord, payload: P) -> bool
    where
        P: DormantPayload + Send + Sync + 'static,
    {
        match self.dormant.get_mut(&space) {
            Some(cache) if cache.is_enabled() => {
                cache.put(coord, StoredRegion::new(payload));
                true
            }
            _ => false,
        }
    }

    /// Detached copy of a cached region, if the space still holds one of
    /// type `P` for `coord`.
    pub fn fetch_dormant<P>(&self, space: SpaceId, coord: RegionCoord) -> Option<P>
    where
        P: DormantPayload + 'static,
    {
        self.dormant.get(&space)?.get(&coord)?.detached()
    }

    /// Number of regions cached for the space.
    pub fn dormant_count(&self, space: SpaceId) -> usize {
        self.dormant.get(&space).map_or(0, DormantCache::len)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn registered_owner(&self, owner: &str) -> Result<OwnerId> {
        if !self.callbacks.contains(owner) {
            error!(owner, "owner requested a ticket without a loading callback");
            return Err(ForceError::UnregisteredOwner(owner.to_string()));
        }
        Ok(OwnerId::from(owner))
    }

    fn registry_of<'a>(
        spaces: &'a mut HashMap<SpaceId, SpaceTickets>,
        locations: &HashMap<TicketId, SpaceId>,
        id: TicketId,
    ) -> Result<&'a mut SpaceTickets> {
        let space = locations.get(&id).ok_or_else(|| {
            warn!(ticket = %id, "operation on a released ticket");
            released(id)
        })?;
        spaces.get_mut(space).ok_or(ForceError::UnknownSpace(space.0))
    }
}

fn released(id: TicketId) -> ForceError {
    ForceError::InvalidTicket(format!("{} has been released", id))
}
