// ============================================================================
// Per-space ticket registry
// ============================================================================
//
// Owns every live ticket of one space instance together with the forced
// index for that space. All force/unforce traffic goes through here so the
// ticket's ordered set and the reverse index can never disagree.
//
// ============================================================================

pub mod player;

pub use player::PlayerPool;

use crate::core::{ForceError, PLAYER_TICKET_HOLDER, RegionCoord, Result, SpaceId, TicketId};
use crate::events::{ForceEvent, ForceEventKind, ForceEventSink};
use crate::index::{ForcedIndex, ForcedSnapshot};
use crate::ticket::{Ticket, TicketHolder, TrackedEntity};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct SpaceTickets {
    space: SpaceId,
    /// Holder name -> tickets in request order. Player tickets share one bucket.
    buckets: BTreeMap<String, Vec<TicketId>>,
    tickets: HashMap<TicketId, Ticket>,
    index: ForcedIndex,
}

fn holder_name(ticket: &Ticket) -> &str {
    match ticket.holder() {
        TicketHolder::Owner => ticket.owner().as_str(),
        TicketHolder::Player(_) => PLAYER_TICKET_HOLDER,
    }
}

fn invalid_ticket(id: TicketId) -> ForceError {
    ForceError::InvalidTicket(format!("{} is not registered", id))
}

impl SpaceTickets {
    pub fn new(space: SpaceId) -> Self {
        Self {
            space,
            buckets: BTreeMap::new(),
            tickets: HashMap::new(),
            index: ForcedIndex::new(),
        }
    }

    pub fn space(&self) -> SpaceId {
        self.space
    }

    pub fn contains(&self, id: TicketId) -> bool {
        self.tickets.contains_key(&id)
    }

    pub fn get(&self, id: TicketId) -> Option<&Ticket> {
        self.tickets.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TicketId) -> Option<&mut Ticket> {
        self.tickets.get_mut(&id)
    }

    pub fn ticket_count(&self) -> usize {
        self.tickets.len()
    }

    /// Live owner-held tickets (player tickets are not counted).
    pub fn owner_count(&self, owner: &str) -> usize {
        if owner == PLAYER_TICKET_HOLDER {
            return 0;
        }
        self.buckets.get(owner).map_or(0, Vec::len)
    }

    /// Ticket ids filed under `holder`, in request order.
    pub fn tickets_of(&self, holder: &str) -> Vec<TicketId> {
        self.buckets.get(holder).cloned().unwrap_or_default()
    }

    /// Holders with their tickets, holders sorted by name.
    pub fn holders(&self) -> Vec<(&str, Vec<&Ticket>)> {
        self.buckets
            .iter()
            .map(|(holder, ids)| {
                let tickets = ids.iter().filter_map(|id| self.tickets.get(id)).collect();
                (holder.as_str(), tickets)
            })
            .collect()
    }

    pub fn snapshot(&self) -> ForcedSnapshot {
        self.index.snapshot()
    }

    /// Registers a fresh ticket with nothing forced.
    pub(crate) fn insert(&mut self, ticket: Ticket) -> TicketId {
        let id = ticket.id();
        self.buckets
            .entry(holder_name(&ticket).to_string())
            .or_default()
            .push(id);
        self.tickets.insert(id, ticket);
        id
    }

    /// Registers already validated tickets and installs their forced regions
    /// in one index publish. No events are emitted.
    pub(crate) fn restore(&mut self, tickets: Vec<Ticket>) -> Vec<TicketId> {
        let mut entries = Vec::new();
        let mut ids = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            let id = ticket.id();
            entries.extend(ticket.forced_regions().into_iter().map(|coord| (coord, id)));
            ids.push(self.insert(ticket));
        }
        self.index.install(entries);
        ids
    }

    /// Unforces everything the ticket holds, then drops it.
    pub(crate) fn remove(&mut self, id: TicketId, sink: &dyn ForceEventSink) -> Option<Ticket> {
        let forced = self.tickets.get(&id)?.forced_regions();
        for coord in forced {
            self.unforce_inner(id, &coord, sink);
        }
        let ticket = self.tickets.remove(&id)?;
        let holder = holder_name(&ticket).to_string();
        if let Some(bucket) = self.buckets.get_mut(&holder) {
            bucket.retain(|held| *held != id);
            if bucket.is_empty() {
                self.buckets.remove(&holder);
            }
        }
        Some(ticket)
    }

    pub fn force(&mut self, id: TicketId, coord: RegionCoord, sink: &dyn ForceEventSink) -> Result<()> {
        let ticket = self.tickets.get_mut(&id).ok_or_else(|| invalid_ticket(id))?;
        if !ticket.can_force() {
            warn!(
                owner = %ticket.owner(),
                ticket = %id,
                "attempted to force a region with an entity ticket that has no entity"
            );
            return Err(ForceError::InvalidTicket(format!(
                "{} is an entity ticket without a bound entity",
                id
            )));
        }
        if ticket.depth() == 0 {
            warn!(owner = %ticket.owner(), ticket = %id, region = %coord, "ticket depth is zero, region not forced");
            return Ok(());
        }
        if !ticket.push_forced(coord) {
            return Ok(());
        }
        let owner = ticket.owner().clone();
        let evict = ticket.overflow_head();

        self.index.insert(coord, id);
        sink.publish(ForceEvent {
            kind: ForceEventKind::Forced,
            space: self.space,
            ticket: id,
            owner,
            region: coord,
        });

        if let Some(head) = evict {
            debug!(ticket = %id, region = %head, "ticket over depth, evicting oldest region");
            self.unforce_inner(id, &head, sink);
        }
        Ok(())
    }

    pub fn unforce(&mut self, id: TicketId, coord: &RegionCoord, sink: &dyn ForceEventSink) -> Result<()> {
        if !self.tickets.contains_key(&id) {
            return Err(invalid_ticket(id));
        }
        self.unforce_inner(id, coord, sink);
        Ok(())
    }

    fn unforce_inner(&mut self, id: TicketId, coord: &RegionCoord, sink: &dyn ForceEventSink) -> bool {
        let Some(ticket) = self.tickets.get_mut(&id) else {
            return false;
        };
        if !ticket.remove_forced(coord) {
            return false;
        }
        let owner = ticket.owner().clone();
        self.index.remove(coord, id);
        sink.publish(ForceEvent {
            kind: ForceEventKind::Unforced,
            space: self.space,
            ticket: id,
            owner,
            region: *coord,
        });
        true
    }

    pub fn reorder(&mut self, id: TicketId, coord: &RegionCoord) -> Result<()> {
        let ticket = self.tickets.get_mut(&id).ok_or_else(|| invalid_ticket(id))?;
        ticket.move_to_tail(coord);
        Ok(())
    }

    /// Applies a depth change within `max`. Returns whether it was accepted.
    ///
    /// Shrinking below the current forced count unforces the oldest regions.
    pub fn set_depth(
        &mut self,
        id: TicketId,
        depth: u32,
        max: u32,
        sink: &dyn ForceEventSink,
    ) -> Result<bool> {
        let ticket = self.tickets.get_mut(&id).ok_or_else(|| invalid_ticket(id))?;
        let accepted = if max == 0 { depth == 0 } else { depth > 0 && depth <= max };
        if !accepted {
            warn!(
                owner = %ticket.owner(),
                requested = depth,
                allowed = max,
                "ticket depth change rejected"
            );
            return Ok(false);
        }
        ticket.set_depth_unchecked(depth);

        while let Some(head) = self.tickets.get(&id).and_then(Ticket::overflow_head) {
            self.unforce_inner(id, &head, sink);
        }
        Ok(true)
    }

    pub fn bind(&mut self, id: TicketId, entity: Arc<dyn TrackedEntity>) -> Result<()> {
        let ticket = self.tickets.get_mut(&id).ok_or_else(|| invalid_ticket(id))?;
        ticket.bind(entity)
    }
}
