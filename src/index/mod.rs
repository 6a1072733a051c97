use crate::core::{RegionCoord, TicketId};
use im::{OrdMap, OrdSet};

/// Immutable view of every forced region in one space.
///
/// Cloning is O(1); the maps share structure with the snapshot they were
/// derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForcedSnapshot {
    regions: OrdMap<RegionCoord, OrdSet<TicketId>>,
}

impl ForcedSnapshot {
    pub fn contains(&self, coord: &RegionCoord) -> bool {
        self.regions.contains_key(coord)
    }

    pub fn tickets_at(&self, coord: &RegionCoord) -> Option<&OrdSet<TicketId>> {
        self.regions.get(coord)
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> impl Iterator<Item = &RegionCoord> {
        self.regions.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RegionCoord, &OrdSet<TicketId>)> {
        self.regions.iter()
    }
}

/// Reverse index region -> forcing tickets.
///
/// Writers derive a new snapshot from the current one plus the delta and
/// publish it in one assignment. Anything holding an earlier snapshot keeps
/// seeing exactly that state.
#[derive(Debug, Default)]
pub struct ForcedIndex {
    current: ForcedSnapshot,
}

impl ForcedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ForcedSnapshot {
        self.current.clone()
    }

    pub fn is_forced(&self, coord: &RegionCoord) -> bool {
        self.current.contains(coord)
    }

    pub fn insert(&mut self, coord: RegionCoord, ticket: TicketId) {
        let holders = self.current.regions.get(&coord).cloned().unwrap_or_default();
        let next = self.current.regions.update(coord, holders.update(ticket));
        self.publish(next);
    }

    pub fn remove(&mut self, coord: &RegionCoord, ticket: TicketId) {
        let Some(holders) = self.current.regions.get(coord) else {
            return;
        };
        if !holders.contains(&ticket) {
            return;
        }
        let remaining = holders.without(&ticket);
        let next = if remaining.is_empty() {
            self.current.regions.without(coord)
        } else {
            self.current.regions.update(*coord, remaining)
        };
        self.publish(next);
    }

    /// Installs many entries with a single publish.
    pub fn install<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (RegionCoord, TicketId)>,
    {
        let mut next = self.current.regions.clone();
        for (coord, ticket) in entries {
            let holders = next.get(&coord).cloned().unwrap_or_default();
            next.insert(coord, holders.update(ticket));
        }
        self.publish(next);
    }

    fn publish(&mut self, regions: OrdMap<RegionCoord, OrdSet<TicketId>>) {
        self.current = ForcedSnapshot { regions };
    }
}
