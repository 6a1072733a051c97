use crate::core::{SpaceId, TicketId};
use std::collections::HashMap;

/// Process-wide player ticket pool, shared by every owner and every space.
#[derive(Debug, Default)]
pub struct PlayerPool {
    by_player: HashMap<String, Vec<(SpaceId, TicketId)>>,
}

impl PlayerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, player: &str) -> usize {
        self.by_player.get(player).map_or(0, Vec::len)
    }

    pub fn contains(&self, player: &str, ticket: TicketId) -> bool {
        self.by_player
            .get(player)
            .is_some_and(|held| held.iter().any(|(_, id)| *id == ticket))
    }

    pub fn add(&mut self, player: &str, space: SpaceId, ticket: TicketId) {
        self.by_player
            .entry(player.to_string())
            .or_default()
            .push((space, ticket));
    }

    pub fn remove(&mut self, player: &str, ticket: TicketId) -> bool {
        let Some(held) = self.by_player.get_mut(player) else {
            return false;
        };
        let before = held.len();
        held.retain(|(_, id)| *id != ticket);
        let removed = held.len() != before;
        if held.is_empty() {
            self.by_player.remove(player);
        }
        removed
    }

    /// Drops every entry that belongs to `space`.
    pub fn remove_space(&mut self, space: SpaceId) {
        self.by_player.retain(|_, held| {
            held.retain(|(s, _)| *s != space);
            !held.is_empty()
        });
    }

    pub fn players(&self) -> impl Iterator<Item = &str> {
        self.by_player.keys().map(|s| s.as_str())
    }

    pub fn clear(&mut self) {
        self.by_player.clear();
    }
}
