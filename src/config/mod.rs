//! Quota configuration for region forcing.
//!
//! The configuration is a small JSON document:
//!
//! ```json
//! {
//!   "defaults": {
//!     "overrides_enabled": true,
//!     "maximum_ticket_count": 200,
//!     "maximum_regions_per_ticket": 25,
//!     "player_ticket_count": 500,
//!     "dormant_cache_size": 0
//!   },
//!   "owners": {
//!     "quarry": { "maximum_ticket_count": 4, "maximum_regions_per_ticket": 9 }
//!   }
//! }
//! ```
//!
//! A value of zero in either owner entry disables forcing for that owner.

pub mod quota;

pub use quota::QuotaTable;

use crate::core::{ForceError, OwnerId, PLAYER_TICKET_HOLDER, Result};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

pub const DEFAULT_MAX_TICKETS: u32 = 200;
pub const DEFAULT_MAX_REGIONS_PER_TICKET: u32 = 25;
pub const DEFAULT_PLAYER_TICKET_COUNT: u32 = 500;
pub const DEFAULT_DORMANT_CACHE_SIZE: u32 = 0;

/// Global limits used when an owner has no override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaDefaults {
    /// Are owner overrides consulted at all?
    pub overrides_enabled: bool,
    pub maximum_ticket_count: u32,
    pub maximum_regions_per_ticket: u32,
    /// Tickets a single player can hold, shared across every owner.
    pub player_ticket_count: u32,
    /// Regions kept in each space's dormant cache. Zero disables it.
    pub dormant_cache_size: u32,
}

impl Default for QuotaDefaults {
    fn default() -> Self {
        Self {
            overrides_enabled: true,
            maximum_ticket_count: DEFAULT_MAX_TICKETS,
            maximum_regions_per_ticket: DEFAULT_MAX_REGIONS_PER_TICKET,
            player_ticket_count: DEFAULT_PLAYER_TICKET_COUNT,
            dormant_cache_size: DEFAULT_DORMANT_CACHE_SIZE,
        }
    }
}

/// Per-owner override section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerQuota {
    #[serde(default = "default_max_tickets")]
    pub maximum_ticket_count: u32,
    #[serde(default = "default_max_regions")]
    pub maximum_regions_per_ticket: u32,
}

fn default_max_tickets() -> u32 {
    DEFAULT_MAX_TICKETS
}

fn default_max_regions() -> u32 {
    DEFAULT_MAX_REGIONS_PER_TICKET
}

impl Default for OwnerQuota {
    fn default() -> Self {
        Self {
            maximum_ticket_count: DEFAULT_MAX_TICKETS,
            maximum_regions_per_ticket: DEFAULT_MAX_REGIONS_PER_TICKET,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub defaults: QuotaDefaults,
    pub owners: BTreeMap<String, OwnerQuota>,
}

impl QuotaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable owner overrides
    pub fn overrides_enabled(mut self, enabled: bool) -> Self {
        self.defaults.overrides_enabled = enabled;
        self
    }

    /// Set the default ticket count for owners without an override
    pub fn max_tickets(mut self, max: u32) -> Self {
        self.defaults.maximum_ticket_count = max;
        self
    }

    /// Set the default per-ticket region count for owners without an override
    pub fn max_regions_per_ticket(mut self, max: u32) -> Self {
        self.defaults.maximum_regions_per_ticket = max;
        self
    }

    /// Set the shared per-player ticket pool size
    pub fn player_ticket_count(mut self, count: u32) -> Self {
        self.defaults.player_ticket_count = count;
        self
    }

    /// Set the dormant cache capacity
    pub fn dormant_cache_size(mut self, size: u32) -> Self {
        self.defaults.dormant_cache_size = size;
        self
    }

    /// Add or replace an owner override. The reserved player holder name is ignored.
    pub fn with_owner(mut self, owner: impl Into<OwnerId>, max_tickets: u32, max_regions: u32) -> Self {
        let owner = owner.into();
        if owner.is_reserved() {
            warn!("ignoring quota override for reserved owner name '{}'", owner);
            return self;
        }
        self.owners.insert(
            owner.as_str().to_string(),
            OwnerQuota {
                maximum_ticket_count: max_tickets,
                maximum_regions_per_ticket: max_regions,
            },
        );
        self
    }

    pub fn owner_override(&self, owner: &str) -> Option<&OwnerQuota> {
        if owner == PLAYER_TICKET_HOLDER {
            return None;
        }
        self.owners.get(owner)
    }

    /// Owners that carry an override section
    pub fn owner_names(&self) -> Vec<&str> {
        self.owners
            .keys()
            .map(|s| s.as_str())
            .filter(|name| *name != PLAYER_TICKET_HOLDER)
            .collect()
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: QuotaConfig = serde_json::from_str(raw)?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load the configuration file, falling back to defaults.
    ///
    /// A missing file is created with the defaults. A file that cannot be read
    /// or parsed is moved aside to `<name>.bak` and the defaults are used.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            if let Err(err) = config.save(path) {
                warn!("unable to write default quota config '{}': {}", path.display(), err);
            }
            return config;
        }

        let parsed = fs::read_to_string(path)
            .map_err(ForceError::from)
            .and_then(|raw| Self::from_json_str(&raw));

        match parsed {
            Ok(config) => config,
            Err(err) => {
                let backup = backup_path(path);
                if backup.exists()
                    && let Err(remove_err) = fs::remove_file(&backup)
                {
                    warn!(
                        "unable to remove old quota config backup '{}': {}",
                        backup.display(),
                        remove_err
                    );
                }
                if let Err(rename_err) = fs::rename(path, &backup) {
                    warn!(
                        "unable to back up invalid quota config '{}': {}",
                        path.display(),
                        rename_err
                    );
                }
                error!(
                    "critical error reading quota config '{}', defaults will be used - the invalid file is backed up at '{}': {}",
                    path.display(),
                    backup.display(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Write the configuration as pretty JSON, replacing the file atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|e| {
            ForceError::IoError(format!("Failed to create config directory '{}': {}", parent.display(), e))
        })?;
        let body = self.to_json_string()?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(body.as_bytes())?;
        temp.flush()?;
        temp.persist(path)
            .map_err(|e| ForceError::IoError(format!("Failed to replace config '{}': {}", path.display(), e)))?;
        Ok(())
    }
}

fn backup_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}
