pub mod codec;
pub mod file;

pub use codec::{PersistedHolder, PersistedTicket, PersistedTickets};
pub use file::{ForcedRegionsStore, FORCED_REGIONS_FILE, has_persisted_tickets};
