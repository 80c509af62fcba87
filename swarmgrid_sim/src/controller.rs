//! Per-agent controller state.
//!
//! Each agent privately tracks its committed path, its local view of other
//! agents' intents, a reservation table rebuilt every tick, and a vector
//! clock whose own entry doubles as the conflict-resolution priority: the
//! agent with the larger clock yields.

use std::collections::HashMap;

use swarmgrid_core::{AgentId, Cell, Path, ReservationTable, Tick};

/// Consecutive planning failures tolerated before a replan is forced.
pub const MAX_WAIT: u32 = 5;
/// How many steps ahead announced paths are compared for conflicts.
pub const LOOKAHEAD_WINDOW: usize = 15;
/// Intents older than this many ticks are purged before broadcasting.
pub const INTENT_TTL: Tick = 5;
/// Ticks between periodic state syncs.
pub const STATE_SYNC_INTERVAL: Tick = 10;
/// A state sync is also forced after this long without receiving one.
pub const STATE_SYNC_TIMEOUT: Tick = 15;
/// Copies sent per logical message to tolerate drops.
pub const REDUNDANCY_FACTOR: usize = 3;
/// Length of the constant path broadcast by parked agents.
pub const PARKED_PATH_LEN: usize = 200;
/// Ticks without movement before an agent counts as deadlocked.
pub const STUCK_THRESHOLD: u32 = 6;
/// Lower threshold for quarantined agents.
pub const STUCK_THRESHOLD_QUARANTINED: u32 = 3;

/// What this controller last heard another agent intend.
#[derive(Debug, Clone)]
pub struct OtherAgentIntent {
    pub from: AgentId,
    pub next: Cell,
    pub timestamp: Tick,
    pub planned_path: Path,
}

/// Private state of one agent's controller.
#[derive(Debug)]
pub struct AgentController {
    pub id: AgentId,
    pub current_path: Path,
    /// Cursor into `current_path`; always `<= current_path.len()`.
    pub path_index: usize,
    pub last_intent: Cell,
    pub needs_replan: bool,
    pub wait_counter: u32,
    pub known_intents: HashMap<AgentId, OtherAgentIntent>,
    /// Rebuilt each tick from incoming messages plus the own committed path.
    pub local_reservations: ReservationTable,
    /// Highest StateSync sequence number accepted per sender.
    pub last_seen_sequence: HashMap<AgentId, u64>,
    pub last_state_broadcast: Tick,
    pub last_state_received: Tick,
    pub vector_clock: HashMap<AgentId, u64>,
    /// Mirror of `vector_clock[id]`.
    pub local_clock: u64,
    pub stuck_counter: u32,
    pub last_position: Option<Cell>,
    pub last_successful_move: Tick,
}

impl AgentController {
    pub fn new(id: AgentId, start: Cell) -> Self {
        Self {
            id,
            current_path: Path::new(),
            path_index: 0,
            last_intent: start,
            needs_replan: true,
            wait_counter: 0,
            known_intents: HashMap::new(),
            local_reservations: ReservationTable::new(),
            last_seen_sequence: HashMap::new(),
            last_state_broadcast: 0,
            last_state_received: 0,
            vector_clock: HashMap::from([(id, 0)]),
            local_clock: 0,
            stuck_counter: 0,
            last_position: None,
            last_successful_move: 0,
        }
    }

    /// The unexecuted suffix of the committed path.
    pub fn remaining_path(&self) -> &[Cell] {
        &self.current_path[self.path_index.min(self.current_path.len())..]
    }

    /// The cell this agent intends to occupy next, if any remains queued.
    pub fn next_cell(&self) -> Option<Cell> {
        self.current_path.get(self.path_index).copied()
    }

    pub fn path_exhausted(&self) -> bool {
        self.path_index >= self.current_path.len()
    }

    /// Advances the local clock by one observed event and mirrors it into
    /// the vector clock.
    pub fn tick_clock(&mut self) -> u64 {
        self.local_clock += 1;
        self.vector_clock.insert(self.id, self.local_clock);
        self.local_clock
    }

    /// Merges a received vector clock, then counts the receipt itself as an
    /// event: `local = max(local, vc[self]) + 1`.
    pub fn merge_clock(&mut self, other: &HashMap<AgentId, u64>) {
        for (&agent, &value) in other {
            let entry = self.vector_clock.entry(agent).or_insert(0);
            if value > *entry {
                *entry = value;
            }
        }
        let own = self.vector_clock.get(&self.id).copied().unwrap_or(0);
        self.local_clock = self.local_clock.max(own) + 1;
        self.vector_clock.insert(self.id, self.local_clock);
    }

    /// Records another agent's announced intent (one slot per sender).
    pub fn upsert_intent(&mut self, intent: OtherAgentIntent) {
        self.known_intents.insert(intent.from, intent);
    }

    /// Drops intents older than [`INTENT_TTL`] ticks.
    pub fn purge_stale_intents(&mut self, current_tick: Tick) {
        let cutoff = current_tick.saturating_sub(INTENT_TTL);
        self.known_intents.retain(|_, intent| intent.timestamp >= cutoff);
    }

    /// Decides the loser of a predicted path conflict.
    ///
    /// Smaller `(clock, id)` wins and keeps its path; the agent further
    /// ahead in observed events yields. Returns true when WE must replan.
    /// Missing clocks on either side fall back to the id order alone.
    pub fn loses_conflict(&self, sender: AgentId, sender_clock: Option<u64>) -> bool {
        let ours = self.vector_clock.get(&self.id).copied();
        match (sender_clock, ours) {
            (Some(theirs), Some(ours)) => {
                if ours != theirs {
                    ours > theirs
                } else {
                    sender < self.id
                }
            }
            _ => sender < self.id,
        }
    }
}
