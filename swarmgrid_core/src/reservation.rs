//! The spatial-temporal reservation table.
//!
//! Maps `(cell, tick)` to the agent claiming it. Two indices: a unique
//! primary on the key, and a per-agent secondary so clearing one agent's
//! claims never scans the whole table. Each controller owns its own table;
//! there are no concurrent writers.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::{AgentId, Cell, Tick};

/// A claim on one cell at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationKey {
    pub x: i32,
    pub y: i32,
    pub t: Tick,
}

impl ReservationKey {
    pub fn new(cell: Cell, t: Tick) -> Self {
        Self { x: cell.x, y: cell.y, t }
    }

    pub fn cell(&self) -> Cell {
        Cell::new(self.x, self.y)
    }
}

/// A key together with its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationEntry {
    pub key: ReservationKey,
    pub agent_id: AgentId,
}

/// Dual-index container over reservation entries.
#[derive(Debug, Clone, Default)]
pub struct ReservationTable {
    by_key: HashMap<ReservationKey, AgentId>,
    by_agent: HashMap<AgentId, HashSet<ReservationKey>>,
}

impl ReservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry. Returns false (leaving the table unchanged) if the
    /// key is already claimed; the caller treats that as a conflict signal.
    pub fn insert(&mut self, entry: ReservationEntry) -> bool {
        match self.by_key.entry(entry.key) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(entry.agent_id);
                self.by_agent
                    .entry(entry.agent_id)
                    .or_default()
                    .insert(entry.key);
                true
            }
        }
    }

    /// Looks up the owner of a key.
    pub fn find(&self, key: &ReservationKey) -> Option<AgentId> {
        self.by_key.get(key).copied()
    }

    /// Removes one entry, returning its former owner.
    pub fn remove(&mut self, key: &ReservationKey) -> Option<AgentId> {
        let owner = self.by_key.remove(key)?;
        if let Some(keys) = self.by_agent.get_mut(&owner) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_agent.remove(&owner);
            }
        }
        Some(owner)
    }

    /// Drops every entry owned by `id` in one secondary-index pass.
    pub fn erase_by_agent(&mut self, id: &AgentId) {
        if let Some(keys) = self.by_agent.remove(id) {
            for key in keys {
                self.by_key.remove(&key);
            }
        }
    }

    /// True iff `(cell, tick)` is claimed by an agent other than `exclude`.
    pub fn is_reserved(&self, cell: Cell, tick: Tick, exclude: Option<AgentId>) -> bool {
        match self.by_key.get(&ReservationKey::new(cell, tick)) {
            Some(owner) => Some(*owner) != exclude,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
        self.by_agent.clear();
    }

    /// Iterates all entries (unordered).
    pub fn entries(&self) -> impl Iterator<Item = ReservationEntry> + '_ {
        self.by_key.iter().map(|(key, agent_id)| ReservationEntry {
            key: *key,
            agent_id: *agent_id,
        })
    }

    /// The keys currently owned by one agent.
    pub fn entries_for(&self, id: &AgentId) -> impl Iterator<Item = ReservationKey> + '_ {
        self.by_agent.get(id).into_iter().flatten().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(x: i32, y: i32, t: Tick, id: AgentId) -> ReservationEntry {
        ReservationEntry {
            key: ReservationKey { x, y, t },
            agent_id: id,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let id = AgentId::from_seed(1);
        let mut table = ReservationTable::new();
        assert!(table.insert(entry(2, 3, 5, id)));
        assert_eq!(table.find(&ReservationKey { x: 2, y: 3, t: 5 }), Some(id));
        assert_eq!(table.find(&ReservationKey { x: 2, y: 3, t: 6 }), None);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let a = AgentId::from_seed(1);
        let b = AgentId::from_seed(2);
        let mut table = ReservationTable::new();
        assert!(table.insert(entry(1, 1, 1, a)));
        assert!(!table.insert(entry(1, 1, 1, b)));
        // First writer wins.
        assert_eq!(table.find(&ReservationKey { x: 1, y: 1, t: 1 }), Some(a));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_erase_by_agent() {
        let a = AgentId::from_seed(1);
        let b = AgentId::from_seed(2);
        let mut table = ReservationTable::new();
        for t in 0..10 {
            table.insert(entry(0, 0, t, a));
            table.insert(entry(1, 1, t, b));
        }

        table.erase_by_agent(&a);
        assert_eq!(table.len(), 10);
        assert!(!table.is_reserved(Cell::new(0, 0), 3, None));
        assert!(table.is_reserved(Cell::new(1, 1), 3, None));
        assert_eq!(table.entries_for(&a).count(), 0);
    }

    #[test]
    fn test_is_reserved_exclude() {
        let a = AgentId::from_seed(1);
        let b = AgentId::from_seed(2);
        let mut table = ReservationTable::new();
        table.insert(entry(4, 4, 7, a));

        assert!(table.is_reserved(Cell::new(4, 4), 7, None));
        assert!(!table.is_reserved(Cell::new(4, 4), 7, Some(a)));
        assert!(table.is_reserved(Cell::new(4, 4), 7, Some(b)));
    }

    #[test]
    fn test_remove_maintains_secondary() {
        let a = AgentId::from_seed(1);
        let mut table = ReservationTable::new();
        table.insert(entry(0, 0, 0, a));
        table.insert(entry(0, 0, 1, a));

        assert_eq!(table.remove(&ReservationKey { x: 0, y: 0, t: 0 }), Some(a));
        assert_eq!(table.entries_for(&a).count(), 1);
        assert_eq!(table.remove(&ReservationKey { x: 0, y: 0, t: 0 }), None);
    }

    #[test]
    fn test_clear() {
        let a = AgentId::from_seed(1);
        let mut table = ReservationTable::new();
        table.insert(entry(0, 0, 0, a));
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.entries_for(&a).count(), 0);
    }
}
