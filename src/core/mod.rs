pub mod error;
pub mod types;

pub use error::{ForceError, Result};
pub use types::{OwnerId, PLAYER_TICKET_HOLDER, RegionCoord, SpaceId, TicketId, TicketKind};
