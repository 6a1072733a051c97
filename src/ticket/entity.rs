use crate::core::RegionCoord;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A live runtime entity that can keep an entity ticket's regions forced.
pub trait TrackedEntity: Send + Sync {
    /// Identity that survives save and reload of the space.
    fn persistent_id(&self) -> Uuid;

    /// Region the entity currently stands in.
    fn region(&self) -> RegionCoord;

    /// Whether the entity would be written out with the space. Tickets bound
    /// to entities that are not persistable are not saved.
    fn is_persistable(&self) -> bool;
}

/// Binding state of an entity ticket.
#[derive(Clone)]
pub enum EntityBinding {
    /// Freshly requested, waiting for the owner to bind an entity.
    Unbound,
    /// Restored from disk; waiting for the host to load the entity.
    Pending { region: RegionCoord, persistent_id: Uuid },
    Bound(Arc<dyn TrackedEntity>),
}

impl EntityBinding {
    pub fn is_bound(&self) -> bool {
        matches!(self, EntityBinding::Bound(_))
    }

    pub fn entity(&self) -> Option<&Arc<dyn TrackedEntity>> {
        match self {
            EntityBinding::Bound(entity) => Some(entity),
            _ => None,
        }
    }
}

impl fmt::Debug for EntityBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityBinding::Unbound => f.write_str("Unbound"),
            EntityBinding::Pending { region, persistent_id } => f
                .debug_struct("Pending")
                .field("region", region)
                .field("persistent_id", persistent_id)
                .finish(),
            EntityBinding::Bound(entity) => f
                .debug_tuple("Bound")
                .field(&entity.persistent_id())
                .finish(),
        }
    }
}
