use super::QuotaConfig;
use std::sync::Arc;

/// Read-only quota lookups over the current configuration snapshot.
///
/// The table holds an `Arc` to an immutable [`QuotaConfig`]; `refresh`
/// swaps in a whole new snapshot, so lookups never see a half-applied edit.
#[derive(Debug, Clone)]
pub struct QuotaTable {
    config: Arc<QuotaConfig>,
}

impl QuotaTable {
    pub fn new(config: QuotaConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    pub fn refresh(&mut self, config: QuotaConfig) {
        self.config = Arc::new(config);
    }

    pub fn max_tickets(&self, owner: &str) -> u32 {
        match self.active_override(owner) {
            Some(quota) => quota.maximum_ticket_count,
            None => self.config.defaults.maximum_ticket_count,
        }
    }

    pub fn max_regions_per_ticket(&self, owner: &str) -> u32 {
        match self.active_override(owner) {
            Some(quota) => quota.maximum_regions_per_ticket,
            None => self.config.defaults.maximum_regions_per_ticket,
        }
    }

    pub fn player_ticket_count(&self) -> u32 {
        self.config.defaults.player_ticket_count
    }

    pub fn dormant_cache_size(&self) -> u32 {
        self.config.defaults.dormant_cache_size
    }

    fn active_override(&self, owner: &str) -> Option<&super::OwnerQuota> {
        if !self.config.defaults.overrides_enabled {
            return None;
        }
        self.config.owner_override(owner)
    }
}

impl Default for QuotaTable {
    fn default() -> Self {
        Self::new(QuotaConfig::default())
    }
}
