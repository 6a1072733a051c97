//! Shared fixtures: a scriptable host, recording callbacks and a cart entity.

#![allow(dead_code)]

use regionforce::{
    ForceManager, LoadingCallback, OrderedLoadingCallback, OwnerId, PendingEntities,
    PlayerOrderedLoadingCallback, RegionCoord, SpaceHost, SpaceId, Ticket, TicketId, TrackedEntity,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const OVERWORLD: SpaceId = SpaceId(0);

#[derive(Default)]
pub struct TestHost {
    pub save_dir: Option<PathBuf>,
    pub inactive: HashSet<String>,
    pub entities: HashMap<RegionCoord, Vec<Arc<dyn TrackedEntity>>>,
    pub loaded_regions: Vec<RegionCoord>,
}

impl TestHost {
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn transient() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: Arc<dyn TrackedEntity>) -> Self {
        self.entities.entry(entity.region()).or_default().push(entity);
        self
    }
}

impl SpaceHost for TestHost {
    fn is_owner_active(&self, owner: &OwnerId) -> bool {
        !self.inactive.contains(owner.as_str())
    }

    fn save_location(&self, _space: SpaceId) -> Option<PathBuf> {
        self.save_dir.clone()
    }

    fn load_region(&mut self, _space: SpaceId, region: RegionCoord, pending: &mut PendingEntities) {
        self.loaded_regions.push(region);
        for entity in self.entities.get(&region).into_iter().flatten() {
            if pending.is_waiting_for(&entity.persistent_id()) {
                pending.entity_loaded(entity.clone());
            }
        }
    }
}

pub struct Cart {
    pub id: Uuid,
    pub region: RegionCoord,
    pub persistable: bool,
}

impl Cart {
    pub fn new(id: Uuid, region: RegionCoord) -> Arc<Self> {
        Arc::new(Self {
            id,
            region,
            persistable: true,
        })
    }
}

impl TrackedEntity for Cart {
    fn persistent_id(&self) -> Uuid {
        self.id
    }

    fn region(&self) -> RegionCoord {
        self.region
    }

    fn is_persistable(&self) -> bool {
        self.persistable
    }
}

/// Base callback that records every notification.
#[derive(Default)]
pub struct Recorder {
    pub calls: Mutex<Vec<(SpaceId, Vec<TicketId>)>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(SpaceId, Vec<TicketId>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Every ticket id delivered so far, in delivery order.
    pub fn delivered(&self) -> Vec<TicketId> {
        self.calls().into_iter().flat_map(|(_, ids)| ids).collect()
    }
}

impl LoadingCallback for Recorder {
    fn tickets_loaded(&self, tickets: &[TicketId], space: SpaceId, _manager: &mut ForceManager) {
        self.calls.lock().unwrap().push((space, tickets.to_vec()));
    }
}

/// Ordering callback choosing tickets by the first forced region.
pub struct Picky {
    pub recorder: Arc<Recorder>,
    pub pick: fn(&[&Ticket]) -> Vec<TicketId>,
    pub seen_max: Mutex<Option<u32>>,
}

impl Picky {
    pub fn new(pick: fn(&[&Ticket]) -> Vec<TicketId>) -> Arc<Self> {
        Arc::new(Self {
            recorder: Recorder::new(),
            pick,
            seen_max: Mutex::new(None),
        })
    }
}

impl LoadingCallback for Picky {
    fn tickets_loaded(&self, tickets: &[TicketId], space: SpaceId, manager: &mut ForceManager) {
        self.recorder.tickets_loaded(tickets, space, manager);
    }

    fn ordered(&self) -> Option<&dyn OrderedLoadingCallback> {
        Some(self)
    }
}

impl OrderedLoadingCallback for Picky {
    fn ordered_tickets_loaded(&self, tickets: &[&Ticket], _space: SpaceId, max_count: u32) -> Vec<TicketId> {
        *self.seen_max.lock().unwrap() = Some(max_count);
        (self.pick)(tickets)
    }
}

/// Player hook that records what it was offered and keeps everything.
#[derive(Default)]
pub struct PlayerWatcher {
    pub recorder: Recorder,
    pub offered: Mutex<BTreeMap<String, Vec<Vec<RegionCoord>>>>,
}

impl PlayerWatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl LoadingCallback for PlayerWatcher {
    fn tickets_loaded(&self, tickets: &[TicketId], space: SpaceId, manager: &mut ForceManager) {
        self.recorder.tickets_loaded(tickets, space, manager);
    }

    fn player_ordered(&self) -> Option<&dyn PlayerOrderedLoadingCallback> {
        Some(self)
    }
}

impl PlayerOrderedLoadingCallback for PlayerWatcher {
    fn player_tickets_loaded(
        &self,
        tickets: &BTreeMap<String, Vec<&Ticket>>,
        _space: SpaceId,
    ) -> BTreeMap<String, Vec<TicketId>> {
        let mut offered = self.offered.lock().unwrap();
        for (player, list) in tickets {
            offered.insert(player.clone(), list.iter().map(|t| t.forced_regions()).collect());
        }
        tickets
            .iter()
            .map(|(player, list)| (player.clone(), list.iter().map(|t| t.id()).collect()))
            .collect()
    }
}

pub fn forced_of(manager: &ForceManager, ids: &[TicketId]) -> Vec<Vec<RegionCoord>> {
    ids.iter()
        .map(|id| manager.ticket(*id).map(|t| t.forced_regions()).unwrap_or_default())
        .collect()
}
