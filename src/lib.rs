// ============================================================================
// regionforce library
// ============================================================================
//
// Ticket based region forcing: owners request tickets under quota, force
// regions of a space through them, and get their tickets back through a
// reconciliation pass when the space is loaded again.
//
// ============================================================================

pub mod cache;
pub mod config;
pub mod core;
pub mod events;
pub mod facade;
pub mod index;
pub mod reconcile;
pub mod registry;
pub mod storage;
pub mod ticket;

// Re-export main types for convenience
pub use cache::{DormantCache, DormantPayload};
pub use config::{QuotaConfig, QuotaTable};
pub use core::{ForceError, OwnerId, RegionCoord, Result, SpaceId, TicketId, TicketKind};
pub use events::{BroadcastEventSink, ForceEvent, ForceEventKind, ForceEventSink, NoopEventSink};
pub use facade::{ForceManager, SpaceHost};
pub use index::ForcedSnapshot;
pub use reconcile::{LoadingCallback, OrderedLoadingCallback, PendingEntities, PlayerOrderedLoadingCallback};
pub use ticket::{Ticket, TicketHolder, TicketPayload, TrackedEntity};
