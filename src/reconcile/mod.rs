// ============================================================================
// Load-time reconciliation
// ============================================================================
//
// Turns a persisted ticket set into the tickets that may go live:
//
//   filter -> entity resolution -> ordering callback -> truncation
//
// Commit and the final notification happen in the manager, which owns the
// registry the survivors are installed into. Tickets dropped here never
// reach the index and produce no events.
//
// ============================================================================

pub mod callback;
pub mod pending;

pub use callback::{CallbackRegistry, LoadingCallback, OrderedLoadingCallback, PlayerOrderedLoadingCallback};
pub use pending::PendingEntities;

use crate::config::QuotaTable;
use crate::core::{OwnerId, SpaceId, TicketId, TicketKind};
use crate::facade::SpaceHost;
use crate::registry::PlayerPool;
use crate::storage::{PersistedHolder, PersistedTicket, PersistedTickets};
use crate::ticket::{EntityBinding, Ticket, TicketBinding, TicketHolder};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Surviving owner-held tickets of one owner, in final order.
pub struct OwnerTickets {
    pub owner: OwnerId,
    pub tickets: Vec<Ticket>,
}

/// Surviving player-bound tickets requested through one owner.
pub struct PlayerTickets {
    pub owner: OwnerId,
    pub by_player: BTreeMap<String, Vec<Ticket>>,
}

#[derive(Default)]
pub struct Reconciled {
    pub owners: Vec<OwnerTickets>,
    pub players: Vec<PlayerTickets>,
}

impl Reconciled {
    pub fn ticket_count(&self) -> usize {
        let owned: usize = self.owners.iter().map(|o| o.tickets.len()).sum();
        let player: usize = self
            .players
            .iter()
            .flat_map(|p| p.by_player.values())
            .map(Vec::len)
            .sum();
        owned + player
    }
}

pub struct ReconciliationEngine<'a> {
    space: SpaceId,
    quotas: &'a QuotaTable,
    callbacks: &'a CallbackRegistry,
    players: &'a PlayerPool,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(
        space: SpaceId,
        quotas: &'a QuotaTable,
        callbacks: &'a CallbackRegistry,
        players: &'a PlayerPool,
    ) -> Self {
        Self {
            space,
            quotas,
            callbacks,
            players,
        }
    }

    pub fn run(&self, persisted: PersistedTickets, host: &mut dyn SpaceHost) -> Reconciled {
        let mut owned: BTreeMap<OwnerId, Vec<Ticket>> = BTreeMap::new();
        let mut player_owned: BTreeMap<OwnerId, BTreeMap<String, Vec<Ticket>>> = BTreeMap::new();

        for holder in persisted.holders {
            self.filter_holder(holder, &*host, &mut owned, &mut player_owned);
        }

        self.resolve_entities(&mut owned, &mut player_owned, host);

        let owners = owned
            .into_iter()
            .filter_map(|(owner, tickets)| self.select_owner_tickets(owner, tickets))
            .collect();

        let mut committed_per_player: HashMap<String, usize> = HashMap::new();
        let players = player_owned
            .into_iter()
            .filter_map(|(owner, by_player)| self.select_player_tickets(owner, by_player, &mut committed_per_player))
            .collect();

        Reconciled { owners, players }
    }

    fn owner_is_usable(&self, owner: &OwnerId, host: &dyn SpaceHost) -> bool {
        if !host.is_owner_active(owner) {
            warn!(
                owner = %owner,
                space = %self.space,
                "found forced region data for an owner that is not active, it will be removed"
            );
            return false;
        }
        if !self.callbacks.contains(owner.as_str()) {
            warn!(
                owner = %owner,
                space = %self.space,
                "owner has persisted tickets but no loading callback, they will be removed"
            );
            return false;
        }
        true
    }

    fn filter_holder(
        &self,
        holder: PersistedHolder,
        host: &dyn SpaceHost,
        owned: &mut BTreeMap<OwnerId, Vec<Ticket>>,
        player_owned: &mut BTreeMap<OwnerId, BTreeMap<String, Vec<Ticket>>>,
    ) {
        let is_player_holder = holder.is_player_holder();
        let holder_owner = OwnerId::new(holder.owner.clone());
        if !is_player_holder && !self.owner_is_usable(&holder_owner, host) {
            return;
        }

        let mut checked_player_owners: HashMap<OwnerId, bool> = HashMap::new();
        for record in holder.tickets {
            if is_player_holder {
                let (Some(owner), Some(player)) = (record.owner_override.clone(), record.player.clone()) else {
                    warn!(space = %self.space, "player ticket without owner or player name dropped");
                    continue;
                };
                let owner = OwnerId::new(owner);
                let usable = *checked_player_owners
                    .entry(owner.clone())
                    .or_insert_with(|| self.owner_is_usable(&owner, host));
                if !usable {
                    continue;
                }
                let Some(ticket) = self.rebuild(&owner, TicketHolder::Player(player.clone()), &record) else {
                    continue;
                };
                player_owned
                    .entry(owner)
                    .or_default()
                    .entry(player)
                    .or_default()
                    .push(ticket);
            } else {
                let owner = record
                    .owner_override
                    .clone()
                    .map(OwnerId::new)
                    .unwrap_or_else(|| holder_owner.clone());
                if owner != holder_owner && !self.owner_is_usable(&owner, host) {
                    continue;
                }
                if let Some(ticket) = self.rebuild(&owner, TicketHolder::Owner, &record) {
                    owned.entry(owner).or_default().push(ticket);
                }
            }
        }
    }

    fn rebuild(&self, owner: &OwnerId, holder: TicketHolder, record: &PersistedTicket) -> Option<Ticket> {
        let Some(kind) = record.kind() else {
            warn!(owner = %owner, ordinal = record.kind, "ticket with unknown kind dropped");
            return None;
        };
        let binding = match kind {
            TicketKind::Normal => TicketBinding::Normal,
            TicketKind::Entity => {
                let Some((region, persistent_id)) = record.entity_identity() else {
                    warn!(owner = %owner, "entity ticket without entity position or id dropped");
                    return None;
                };
                TicketBinding::Entity(EntityBinding::Pending { region, persistent_id })
            }
        };
        let max = self.quotas.max_regions_per_ticket(owner.as_str());
        // A saturated byte only says "255 or more".
        let depth = if record.depth == u8::MAX {
            max
        } else {
            u32::from(record.depth).min(max)
        };
        Some(Ticket::restored(
            owner.clone(),
            holder,
            binding,
            self.space,
            depth,
            record.forced.clone(),
            record.payload.clone(),
        ))
    }

    fn resolve_entities(
        &self,
        owned: &mut BTreeMap<OwnerId, Vec<Ticket>>,
        player_owned: &mut BTreeMap<OwnerId, BTreeMap<String, Vec<Ticket>>>,
        host: &mut dyn SpaceHost,
    ) {
        let mut pending = PendingEntities::new();
        let mut regions = Vec::new();
        let all = owned
            .values()
            .flatten()
            .chain(player_owned.values().flat_map(|m| m.values()).flatten());
        for ticket in all {
            if let Some((region, persistent_id)) = ticket.pending_entity() {
                pending.expect(persistent_id, ticket.id());
                regions.push((ticket.id(), region));
            }
        }
        if regions.is_empty() {
            return;
        }

        for (ticket, region) in regions {
            if pending.is_bound(ticket) {
                continue;
            }
            // The host's entity load path reports back through `pending`.
            host.load_region(self.space, region, &mut pending);
        }

        let unresolved: HashSet<TicketId> = pending
            .unresolved()
            .map(|(persistent_id, ticket)| {
                warn!(
                    space = %self.space,
                    entity = %persistent_id,
                    "failed to load persistent region forcing entity from store"
                );
                *ticket
            })
            .collect();

        let mut bind = |tickets: &mut Vec<Ticket>| {
            tickets.retain_mut(|ticket| {
                if ticket.pending_entity().is_none() {
                    return true;
                }
                match pending.take_bound(ticket.id()) {
                    Some(entity) => ticket.bind(entity).is_ok(),
                    None => {
                        if !unresolved.contains(&ticket.id()) {
                            warn!(ticket = %ticket.id(), "entity ticket lost its pending entity, dropped");
                        }
                        false
                    }
                }
            });
        };
        owned.values_mut().for_each(&mut bind);
        player_owned
            .values_mut()
            .flat_map(|m| m.values_mut())
            .for_each(&mut bind);
    }

    fn select_owner_tickets(&self, owner: OwnerId, tickets: Vec<Ticket>) -> Option<OwnerTickets> {
        let callback = self.callbacks.get(owner.as_str())?;
        let max = self.quotas.max_tickets(owner.as_str());

        let mut tickets = match callback.ordered() {
            Some(ordered) => {
                let candidates: Vec<&Ticket> = tickets.iter().collect();
                let chosen = ordered.ordered_tickets_loaded(&candidates, self.space, max);
                pick_in_order(tickets, &chosen)
            }
            None => tickets,
        };

        if tickets.len() > max as usize {
            warn!(
                owner = %owner,
                count = tickets.len(),
                max,
                "owner has too many region forcing tickets, excess will be dropped"
            );
            tickets.truncate(max as usize);
        }
        Some(OwnerTickets { owner, tickets })
    }

    fn select_player_tickets(
        &self,
        owner: OwnerId,
        by_player: BTreeMap<String, Vec<Ticket>>,
        committed_per_player: &mut HashMap<String, usize>,
    ) -> Option<PlayerTickets> {
        let callback = self.callbacks.get(owner.as_str())?;

        let mut by_player = match callback.player_ordered() {
            Some(ordered) => {
                let candidates: BTreeMap<String, Vec<&Ticket>> = by_player
                    .iter()
                    .map(|(player, tickets)| (player.clone(), tickets.iter().collect()))
                    .collect();
                let mut chosen = ordered.player_tickets_loaded(&candidates, self.space);
                by_player
                    .into_iter()
                    .filter_map(|(player, tickets)| {
                        let ids = chosen.remove(&player)?;
                        let kept = pick_in_order(tickets, &ids);
                        (!kept.is_empty()).then_some((player, kept))
                    })
                    .collect()
            }
            None => by_player,
        };

        let limit = self.quotas.player_ticket_count() as usize;
        for (player, tickets) in by_player.iter_mut() {
            let used = self.players.count(player) + committed_per_player.get(player).copied().unwrap_or(0);
            let remaining = limit.saturating_sub(used);
            if tickets.len() > remaining {
                warn!(
                    owner = %owner,
                    player = %player,
                    count = tickets.len(),
                    remaining,
                    "player has too many region forcing tickets, excess will be dropped"
                );
                tickets.truncate(remaining);
            }
            *committed_per_player.entry(player.clone()).or_default() += tickets.len();
        }
        by_player.retain(|_, tickets| !tickets.is_empty());

        Some(PlayerTickets { owner, by_player })
    }
}

/// Keeps the tickets named in `chosen`, in that order.
fn pick_in_order(tickets: Vec<Ticket>, chosen: &[TicketId]) -> Vec<Ticket> {
    let mut by_id: HashMap<TicketId, Ticket> = tickets.into_iter().map(|t| (t.id(), t)).collect();
    let mut kept = Vec::with_capacity(chosen.len());
    for id in chosen {
        if let Some(ticket) = by_id.remove(id) {
            kept.push(ticket);
        }
    }
    if !by_id.is_empty() {
        debug!(dropped = by_id.len(), "tickets not selected by ordering callback");
    }
    kept
}
