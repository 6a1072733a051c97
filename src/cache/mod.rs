use crate::config::QuotaConfig;
use crate::core::RegionCoord;
use lru::LruCache;
use std::any::Any;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Region data that may hold references to live entities.
pub trait DormantPayload: Clone {
    /// Puts every embedded entity reference back into the "not yet attached"
    /// state. The host re-attaches them before the region is used again.
    fn detach_entities(&mut self);
}

/// Bounded cache of recently released regions.
///
/// Eviction is by insertion order: `get` does not refresh an entry. A
/// capacity of zero disables the cache and every lookup misses.
pub struct DormantCache<P: DormantPayload> {
    entries: Option<LruCache<RegionCoord, P>>,
}

impl<P: DormantPayload> DormantCache<P> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    pub fn from_config(config: &QuotaConfig) -> Self {
        Self::new(config.defaults.dormant_cache_size as usize)
    }

    pub fn capacity(&self) -> usize {
        self.entries.as_ref().map_or(0, |c| c.cap().get())
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    pub fn put(&mut self, coord: RegionCoord, payload: P) {
        if let Some(entries) = self.entries.as_mut() {
            entries.put(coord, payload);
        }
    }

    /// Detached copy of the cached payload, if any.
    pub fn get(&self, coord: &RegionCoord) -> Option<P> {
        let mut payload = self.entries.as_ref()?.peek(coord)?.clone();
        payload.detach_entities();
        Some(payload)
    }

    pub fn remove(&mut self, coord: &RegionCoord) -> Option<P> {
        self.entries.as_mut()?.pop(coord)
    }

    pub fn clear(&mut self) {
        if let Some(entries) = self.entries.as_mut() {
            entries.clear();
        }
    }
}

/// Region payload of any host type, as kept by the manager's per-space
/// caches. Detaching happens when the payload is fetched back as its own type.
#[derive(Clone)]
pub(crate) struct StoredRegion(Arc<dyn Any + Send + Sync>);

impl StoredRegion {
    pub(crate) fn new<P>(payload: P) -> Self
    where
        P: DormantPayload + Send + Sync + 'static,
    {
        Self(Arc::new(payload))
    }

    /// Detached copy, or `None` if the entry holds another payload type.
    pub(crate) fn detached<P>(&self) -> Option<P>
    where
        P: DormantPayload + 'static,
    {
        let mut payload = self.0.downcast_ref::<P>()?.clone();
        payload.detach_entities();
        Some(payload)
    }
}

impl DormantPayload for StoredRegion {
    fn detach_entities(&mut self) {}
}
