use crate::core::{OwnerId, RegionCoord, SpaceId};
use crate::reconcile::PendingEntities;
use std::path::PathBuf;

/// The simulation that owns the addressable spaces.
///
/// The manager never performs region I/O itself; it asks the host.
pub trait SpaceHost {
    /// Whether the owner is loaded and allowed to hold tickets.
    fn is_owner_active(&self, owner: &OwnerId) -> bool;

    /// Directory the space persists into, `None` for spaces that are never
    /// saved.
    fn save_location(&self, space: SpaceId) -> Option<PathBuf>;

    /// Loads `region` so the entities stored there come up. Every entity
    /// brought up should be reported through
    /// [`PendingEntities::entity_loaded`].
    fn load_region(&mut self, space: SpaceId, region: RegionCoord, pending: &mut PendingEntities);
}
