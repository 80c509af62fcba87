//! The broadcast message model.

use std::collections::HashMap;

use swarmgrid_core::{AgentId, Cell, Path, ReservationTable, Tick};

/// What a broadcast carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Routine intent announcement: the sender's remaining planned path.
    PathAnnouncement,
    /// Periodic anti-entropy sync carrying a reservation-table snapshot.
    StateSync,
    /// The sender has latched its goal and will hold its cell.
    GoalReached,
}

/// A message on the simulated wire.
///
/// Messages never leave the process, so they are plain cloneable values
/// rather than encoded frames.
#[derive(Debug, Clone)]
pub struct Message {
    pub from: AgentId,
    pub kind: MessageKind,
    /// The sender's next intended cell.
    pub next: Cell,
    /// Tick at which the message was sent.
    pub timestamp: Tick,
    /// The sender's remaining planned path.
    pub planned_path: Path,
    /// Monotonic per-sender sequence, gates StateSync application.
    pub sequence_number: u64,
    /// The sender's vector clock at send time.
    pub vector_clock: HashMap<AgentId, u64>,
    /// Reservation-table snapshot; present only for [`MessageKind::StateSync`].
    pub full_state: Option<ReservationTable>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_clone_is_independent() {
        let id = AgentId::from_seed(1);
        let msg = Message {
            from: id,
            kind: MessageKind::PathAnnouncement,
            next: Cell::new(1, 0),
            timestamp: 3,
            planned_path: vec![Cell::new(1, 0), Cell::new(2, 0)],
            sequence_number: 0,
            vector_clock: HashMap::from([(id, 5)]),
            full_state: None,
        };

        let mut copy = msg.clone();
        copy.planned_path.clear();
        assert_eq!(msg.planned_path.len(), 2);
    }
}
