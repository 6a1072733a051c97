//! Tickets: owned handles over a bounded, insertion-ordered set of forced
//! regions.
//!
//! A ticket never touches the forced index itself. The per-space registry
//! drives every mutation so the index and the ticket stay in step.

pub mod entity;

pub use entity::{EntityBinding, TrackedEntity};

use crate::core::{ForceError, OwnerId, RegionCoord, Result, SpaceId, TicketId, TicketKind};
use std::collections::VecDeque;
use std::sync::Arc;

/// Owner defined data persisted with the ticket.
pub type TicketPayload = serde_json::Map<String, serde_json::Value>;

/// Who the ticket counts against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketHolder {
    /// Counts against the owner's ticket quota.
    Owner,
    /// Counts against the named player's share of the player pool.
    Player(String),
}

/// Kind specific state. Entity tickets always carry a binding.
#[derive(Debug, Clone)]
pub enum TicketBinding {
    Normal,
    Entity(EntityBinding),
}

impl TicketBinding {
    fn for_kind(kind: TicketKind) -> Self {
        match kind {
            TicketKind::Normal => TicketBinding::Normal,
            TicketKind::Entity => TicketBinding::Entity(EntityBinding::Unbound),
        }
    }

    pub fn kind(&self) -> TicketKind {
        match self {
            TicketBinding::Normal => TicketKind::Normal,
            TicketBinding::Entity(_) => TicketKind::Entity,
        }
    }
}

#[derive(Debug)]
pub struct Ticket {
    id: TicketId,
    owner: OwnerId,
    space: SpaceId,
    holder: TicketHolder,
    binding: TicketBinding,
    forced: VecDeque<RegionCoord>,
    depth: u32,
    payload: Option<TicketPayload>,
}

impl Ticket {
    pub(crate) fn new(owner: OwnerId, kind: TicketKind, space: SpaceId, depth: u32) -> Self {
        Self {
            id: TicketId::next(),
            owner,
            space,
            holder: TicketHolder::Owner,
            binding: TicketBinding::for_kind(kind),
            forced: VecDeque::new(),
            depth,
            payload: None,
        }
    }

    pub(crate) fn for_player(
        owner: OwnerId,
        player: String,
        kind: TicketKind,
        space: SpaceId,
        depth: u32,
    ) -> Self {
        let mut ticket = Self::new(owner, kind, space, depth);
        ticket.holder = TicketHolder::Player(player);
        ticket
    }

    /// Rebuilds a ticket from its persisted form. Forced regions beyond the
    /// depth are trimmed oldest first.
    pub(crate) fn restored(
        owner: OwnerId,
        holder: TicketHolder,
        binding: TicketBinding,
        space: SpaceId,
        depth: u32,
        forced: Vec<RegionCoord>,
        payload: Option<TicketPayload>,
    ) -> Self {
        let mut ticket = Self {
            id: TicketId::next(),
            owner,
            space,
            holder,
            binding,
            forced: VecDeque::with_capacity(forced.len()),
            depth,
            payload,
        };
        for coord in forced {
            if !ticket.forced.contains(&coord) {
                ticket.forced.push_back(coord);
            }
        }
        while ticket.forced.len() > depth as usize {
            ticket.forced.pop_front();
        }
        ticket
    }

    pub fn id(&self) -> TicketId {
        self.id
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn space(&self) -> SpaceId {
        self.space
    }

    pub fn kind(&self) -> TicketKind {
        self.binding.kind()
    }

    pub fn holder(&self) -> &TicketHolder {
        &self.holder
    }

    pub fn binding(&self) -> &TicketBinding {
        &self.binding
    }

    pub fn is_player_ticket(&self) -> bool {
        matches!(self.holder, TicketHolder::Player(_))
    }

    pub fn player(&self) -> Option<&str> {
        match &self.holder {
            TicketHolder::Player(name) => Some(name),
            TicketHolder::Owner => None,
        }
    }

    /// Current depth bound. Forcing past it evicts the oldest region.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Forced regions, oldest first.
    pub fn forced_regions(&self) -> Vec<RegionCoord> {
        self.forced.iter().copied().collect()
    }

    pub fn forced_count(&self) -> usize {
        self.forced.len()
    }

    pub fn is_forcing(&self, coord: &RegionCoord) -> bool {
        self.forced.contains(coord)
    }

    pub fn payload(&self) -> Option<&TicketPayload> {
        self.payload.as_ref()
    }

    /// Mutable owner payload, created empty on first access.
    pub fn payload_mut(&mut self) -> &mut TicketPayload {
        self.payload.get_or_insert_with(TicketPayload::new)
    }

    pub fn entity(&self) -> Option<&Arc<dyn TrackedEntity>> {
        match &self.binding {
            TicketBinding::Entity(binding) => binding.entity(),
            TicketBinding::Normal => None,
        }
    }

    /// Entity tickets cannot force anything until an entity is bound.
    pub fn can_force(&self) -> bool {
        match &self.binding {
            TicketBinding::Normal => true,
            TicketBinding::Entity(binding) => binding.is_bound(),
        }
    }

    pub(crate) fn bind(&mut self, entity: Arc<dyn TrackedEntity>) -> Result<()> {
        match &mut self.binding {
            TicketBinding::Entity(binding) => {
                *binding = EntityBinding::Bound(entity);
                Ok(())
            }
            TicketBinding::Normal => Err(ForceError::InvalidTicketKind(format!(
                "cannot bind an entity to {} which is a {} ticket",
                self.id,
                TicketKind::Normal
            ))),
        }
    }

    pub(crate) fn pending_entity(&self) -> Option<(RegionCoord, uuid::Uuid)> {
        match &self.binding {
            TicketBinding::Entity(EntityBinding::Pending { region, persistent_id }) => {
                Some((*region, *persistent_id))
            }
            _ => None,
        }
    }

    pub(crate) fn set_depth_unchecked(&mut self, depth: u32) {
        self.depth = depth;
    }

    /// Appends `coord`; returns false if it was already forced.
    pub(crate) fn push_forced(&mut self, coord: RegionCoord) -> bool {
        if self.forced.contains(&coord) {
            return false;
        }
        self.forced.push_back(coord);
        true
    }

    pub(crate) fn remove_forced(&mut self, coord: &RegionCoord) -> bool {
        match self.forced.iter().position(|c| c == coord) {
            Some(pos) => {
                self.forced.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn move_to_tail(&mut self, coord: &RegionCoord) -> bool {
        if !self.remove_forced(coord) {
            return false;
        }
        self.forced.push_back(*coord);
        true
    }

    /// Oldest region while the ticket is over its depth.
    pub(crate) fn overflow_head(&self) -> Option<RegionCoord> {
        if self.forced.len() > self.depth as usize {
            self.forced.front().copied()
        } else {
            None
        }
    }
}
