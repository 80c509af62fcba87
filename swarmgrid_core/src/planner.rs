//! Cooperative A* on the time-expanded grid.
//!
//! Nodes are `(cell, tick)` pairs; from `(c, t)` an agent may step to any
//! free cardinal neighbour or wait in place, landing at `t + 1`. Other
//! agents' trajectories appear as immovable obstacles through the
//! reservation table: a successor is pruned when its cell-time is claimed
//! (vertex conflict) or when taking it would cross an edge another agent is
//! traversing in the opposite direction (head-on swap).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::reservation::{ReservationEntry, ReservationKey, ReservationTable};
use crate::types::{AgentId, Cell, Grid, Path, Tick};

/// How long a committed path keeps its terminal cell claimed past the final
/// step, so other planners treat reached goals as occupied.
pub const GOAL_HOLD_TICKS: Tick = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SearchState {
    f: u32,
    cell: Cell,
    time: Tick,
}

impl Ord for SearchState {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the smallest f on top.
        other.f.cmp(&self.f)
    }
}

impl PartialOrd for SearchState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Plans conflict-free single-agent trajectories against a reservation
/// table.
///
/// Holds its own copy of the immutable grid so planning tasks can run
/// concurrently from a shared `&PathPlanner`.
pub struct PathPlanner {
    grid: Grid,
}

impl PathPlanner {
    pub fn new(grid: Grid) -> Self {
        Self { grid }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Finds a reservation-respecting path from `start` to `goal` beginning
    /// at `start_tick`. Returns an empty path when no route exists before
    /// the search horizon.
    pub fn plan_path(
        &self,
        start: Cell,
        goal: Cell,
        reservations: &ReservationTable,
        agent_id: AgentId,
        start_tick: Tick,
    ) -> Path {
        if !self.grid.is_free(start) || !self.grid.is_free(goal) {
            return Path::new();
        }

        let mut open = BinaryHeap::new();
        let mut g_score: HashMap<(Cell, Tick), u32> = HashMap::new();
        let mut came_from: HashMap<(Cell, Tick), (Cell, Tick)> = HashMap::new();

        g_score.insert((start, start_tick), 0);
        open.push(SearchState {
            f: start.manhattan(&goal),
            cell: start,
            time: start_tick,
        });

        // Horizon bound keeps unsatisfiable searches from expanding forever.
        let max_time =
            start_tick + 2 * (self.grid.width() as Tick) * (self.grid.height() as Tick);

        while let Some(current) = open.pop() {
            if current.cell == goal {
                return reconstruct(&came_from, start, start_tick, current.cell, current.time);
            }

            if current.time >= max_time {
                continue;
            }

            let next_time = current.time + 1;
            let current_g = g_score[&(current.cell, current.time)];

            for next_cell in self.successors(current.cell) {
                // Vertex conflict: the target cell-time is claimed.
                if reservations.is_reserved(next_cell, next_time, Some(agent_id)) {
                    continue;
                }

                // Edge conflict: another agent crosses this edge in reverse.
                if next_cell != current.cell {
                    if let Some(other) =
                        reservations.find(&ReservationKey::new(next_cell, current.time))
                    {
                        if other != agent_id
                            && reservations.find(&ReservationKey::new(current.cell, next_time))
                                == Some(other)
                        {
                            continue;
                        }
                    }
                }

                let tentative_g = current_g + 1;
                let next_key = (next_cell, next_time);
                if tentative_g < *g_score.get(&next_key).unwrap_or(&u32::MAX) {
                    g_score.insert(next_key, tentative_g);
                    came_from.insert(next_key, (current.cell, current.time));
                    open.push(SearchState {
                        f: tentative_g + next_cell.manhattan(&goal),
                        cell: next_cell,
                        time: next_time,
                    });
                }
            }
        }

        Path::new()
    }

    /// Replaces `agent_id`'s claims with the given path, then holds the
    /// terminal cell for [`GOAL_HOLD_TICKS`] further ticks. Keys already
    /// claimed by other agents are left untouched.
    pub fn commit_reservations(
        &self,
        path: &Path,
        agent_id: AgentId,
        reservations: &mut ReservationTable,
        start_tick: Tick,
    ) {
        reservations.erase_by_agent(&agent_id);

        for (i, cell) in path.iter().enumerate() {
            reservations.insert(ReservationEntry {
                key: ReservationKey::new(*cell, start_tick + i as Tick),
                agent_id,
            });
        }

        if let Some(&terminal) = path.last() {
            let arrival = start_tick + path.len() as Tick;
            for ahead in 0..GOAL_HOLD_TICKS {
                reservations.insert(ReservationEntry {
                    key: ReservationKey::new(terminal, arrival + ahead),
                    agent_id,
                });
            }
        }
    }

    /// Drops all of `agent_id`'s claims.
    pub fn clear_reservations(&self, agent_id: AgentId, reservations: &mut ReservationTable) {
        reservations.erase_by_agent(&agent_id);
    }

    /// True iff `(cell, tick)` is claimed by an agent other than `exclude`.
    pub fn is_reserved(
        &self,
        cell: Cell,
        tick: Tick,
        reservations: &ReservationTable,
        exclude: Option<AgentId>,
    ) -> bool {
        reservations.is_reserved(cell, tick, exclude)
    }

    /// Free cardinal neighbours plus waiting in place.
    fn successors(&self, cell: Cell) -> impl Iterator<Item = Cell> + '_ {
        cell.cardinal_neighbors()
            .into_iter()
            .filter(|c| self.grid.is_free(*c))
            .chain(std::iter::once(cell))
    }
}

fn reconstruct(
    came_from: &HashMap<(Cell, Tick), (Cell, Tick)>,
    start: Cell,
    start_tick: Tick,
    goal: Cell,
    goal_time: Tick,
) -> Path {
    let mut path = Vec::new();
    let mut key = (goal, goal_time);

    while key != (start, start_tick) {
        path.push(key.0);
        match came_from.get(&key) {
            Some(prev) => key = *prev,
            None => return Path::new(),
        }
    }
    path.push(start);
    path.reverse();
    path
}
