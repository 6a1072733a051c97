//! Binary layout of the persisted ticket set.
//!
//! gzip( MessagePack map ) with named keys, so optional fields can be left out
//! and older readers skip keys they do not know.

use crate::core::{ForceError, PLAYER_TICKET_HOLDER, RegionCoord, Result, TicketKind};
use crate::registry::SpaceTickets;
use crate::ticket::{Ticket, TicketPayload};
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use uuid::Uuid;

pub const FORMAT_VERSION: u32 = 1;

/// Every persisted ticket of one space, grouped by holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTickets {
    #[serde(rename = "Version")]
    pub version: u32,
    #[serde(rename = "SavedAt", default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(rename = "TicketList", default)]
    pub holders: Vec<PersistedHolder>,
}

impl Default for PersistedTickets {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            saved_at: None,
            holders: Vec::new(),
        }
    }
}

impl PersistedTickets {
    pub fn ticket_count(&self) -> usize {
        self.holders.iter().map(|h| h.tickets.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ticket_count() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedHolder {
    /// Owner id, or the reserved player holder name.
    #[serde(rename = "Owner")]
    pub owner: String,
    #[serde(rename = "Tickets", default)]
    pub tickets: Vec<PersistedTicket>,
}

impl PersistedHolder {
    pub fn is_player_holder(&self) -> bool {
        self.owner == PLAYER_TICKET_HOLDER
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTicket {
    /// Kind ordinal, see [`TicketKind::ordinal`].
    #[serde(rename = "Type")]
    pub kind: u8,
    /// Saturates at `u8::MAX`, which reloads as the owner's current quota.
    #[serde(rename = "ChunkListDepth")]
    pub depth: u8,
    /// Requesting owner for tickets filed under another holder.
    #[serde(rename = "ModId", default, skip_serializing_if = "Option::is_none")]
    pub owner_override: Option<String>,
    #[serde(rename = "Player", default, skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    #[serde(rename = "ModData", default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<TicketPayload>,
    /// Forced regions, oldest first.
    #[serde(rename = "Chunks", default, skip_serializing_if = "Vec::is_empty")]
    pub forced: Vec<RegionCoord>,
    #[serde(rename = "chunkX", default, skip_serializing_if = "Option::is_none")]
    pub entity_chunk_x: Option<i32>,
    #[serde(rename = "chunkZ", default, skip_serializing_if = "Option::is_none")]
    pub entity_chunk_z: Option<i32>,
    #[serde(rename = "PersistentIDMSB", default, skip_serializing_if = "Option::is_none")]
    pub persistent_id_msb: Option<i64>,
    #[serde(rename = "PersistentIDLSB", default, skip_serializing_if = "Option::is_none")]
    pub persistent_id_lsb: Option<i64>,
}

impl PersistedTicket {
    pub fn kind(&self) -> Option<TicketKind> {
        TicketKind::from_ordinal(self.kind)
    }

    /// Last known region and persistent id of an entity ticket's entity.
    pub fn entity_identity(&self) -> Option<(RegionCoord, Uuid)> {
        let x = self.entity_chunk_x?;
        let z = self.entity_chunk_z?;
        let msb = self.persistent_id_msb?;
        let lsb = self.persistent_id_lsb?;
        Some((RegionCoord::new(x, z), Uuid::from_u64_pair(msb as u64, lsb as u64)))
    }

    /// Persisted form of a live ticket, or `None` for entity tickets whose
    /// entity is missing or not persistable.
    pub fn from_ticket(ticket: &Ticket) -> Option<Self> {
        let mut record = PersistedTicket {
            kind: ticket.kind().ordinal(),
            depth: u8::try_from(ticket.depth()).unwrap_or(u8::MAX),
            owner_override: None,
            player: None,
            payload: ticket.payload().cloned(),
            forced: ticket.forced_regions(),
            entity_chunk_x: None,
            entity_chunk_z: None,
            persistent_id_msb: None,
            persistent_id_lsb: None,
        };
        if let Some(player) = ticket.player() {
            record.owner_override = Some(ticket.owner().as_str().to_string());
            record.player = Some(player.to_string());
        }
        if ticket.kind() == TicketKind::Entity {
            let entity = ticket.entity().filter(|e| e.is_persistable())?;
            let region = entity.region();
            let (msb, lsb) = entity.persistent_id().as_u64_pair();
            record.entity_chunk_x = Some(region.x);
            record.entity_chunk_z = Some(region.z);
            record.persistent_id_msb = Some(msb as i64);
            record.persistent_id_lsb = Some(lsb as i64);
        }
        Some(record)
    }
}

/// Builds the persisted record for every ticket of a space.
pub fn snapshot(space: &SpaceTickets) -> PersistedTickets {
    let holders = space
        .holders()
        .into_iter()
        .filter_map(|(owner, tickets)| {
            let tickets: Vec<PersistedTicket> =
                tickets.into_iter().filter_map(PersistedTicket::from_ticket).collect();
            if tickets.is_empty() {
                return None;
            }
            Some(PersistedHolder {
                owner: owner.to_string(),
                tickets,
            })
        })
        .collect();

    PersistedTickets {
        version: FORMAT_VERSION,
        saved_at: Some(Utc::now()),
        holders,
    }
}

pub fn encode(tickets: &PersistedTickets) -> Result<Vec<u8>> {
    let raw = rmp_serde::to_vec_named(tickets)?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}

fn inflate(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut raw)
        .map_err(|e| ForceError::ParseError(format!("Failed to decompress tickets: {}", e)))?;
    Ok(raw)
}

/// Pure deserialization; no owner or quota checks happen here.
pub fn decode(bytes: &[u8]) -> Result<PersistedTickets> {
    let raw = inflate(bytes)?;
    let tickets: PersistedTickets = rmp_serde::from_slice(&raw)?;
    if tickets.version > FORMAT_VERSION {
        return Err(ForceError::ParseError(format!(
            "Unsupported ticket format version {} (newest known {})",
            tickets.version, FORMAT_VERSION
        )));
    }
    Ok(tickets)
}

#[derive(Deserialize)]
struct HolderSkeleton {
    #[serde(rename = "Tickets", default)]
    tickets: Vec<IgnoredAny>,
}

#[derive(Deserialize)]
struct TicketListSkeleton {
    #[serde(rename = "Version")]
    version: u32,
    #[serde(rename = "TicketList", default)]
    holders: Vec<HolderSkeleton>,
}

/// Whether any ticket record exists, without materializing the tickets.
pub fn has_tickets(bytes: &[u8]) -> bool {
    let Ok(raw) = inflate(bytes) else {
        return false;
    };
    match rmp_serde::from_slice::<TicketListSkeleton>(&raw) {
        Ok(list) if list.version <= FORMAT_VERSION => list.holders.iter().any(|h| !h.tickets.is_empty()),
        Ok(_) => false,
        Err(_) => false,
    }
}
