//! Fundamental types: cells, ticks, grids, agents, and the world record.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::world::WorldError;

/// One discrete world step. All agent positions update together between
/// consecutive ticks.
pub type Tick = u64;

/// A grid coordinate. Ordered lexicographically by `x`, then `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another cell.
    pub fn manhattan(&self, other: &Cell) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// The four cardinal neighbours, in `+x, -x, +y, -y` order.
    ///
    /// This order is fixed: collision displacement probes candidates in
    /// exactly this sequence.
    pub fn cardinal_neighbors(&self) -> [Cell; 4] {
        [
            Cell::new(self.x + 1, self.y),
            Cell::new(self.x - 1, self.y),
            Cell::new(self.x, self.y + 1),
            Cell::new(self.x, self.y - 1),
        ]
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// A planned trajectory: `path[i]` is occupied at `start_tick + i`.
/// Consecutive cells are equal (a wait) or 4-adjacent.
pub type Path = Vec<Cell>;

/// Unique identifier for an agent.
///
/// Wraps a UUID; the total order on the underlying bytes is the
/// deterministic tie-break used throughout conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Creates a new random AgentId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic AgentId from a seed (for tests and fixed
    /// scenarios).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Draws an AgentId from a seeded RNG stream, so world construction is
    /// reproducible.
    pub fn from_rng(rng: &mut impl RngCore) -> Self {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// What a grid cell holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    Free,
    Obstacle,
}

/// The immutable map: a `width x height` matrix of cells, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    width: i32,
    height: i32,
    cells: Vec<CellKind>,
}

impl Grid {
    /// Builds a grid from ASCII rows: `.` = free, `#` = obstacle.
    ///
    /// All rows must be non-empty and of equal width; any other character
    /// is an error.
    pub fn from_ascii(rows: &[&str]) -> Result<Self, WorldError> {
        if rows.is_empty() || rows[0].is_empty() {
            return Err(WorldError::EmptyGrid);
        }

        let width = rows[0].chars().count();
        let mut cells = Vec::with_capacity(width * rows.len());

        for row in rows {
            let row_width = row.chars().count();
            if row_width != width {
                return Err(WorldError::InconsistentRowWidth {
                    expected: width,
                    got: row_width,
                });
            }
            for ch in row.chars() {
                match ch {
                    '.' => cells.push(CellKind::Free),
                    '#' => cells.push(CellKind::Obstacle),
                    other => return Err(WorldError::InvalidCharacter(other)),
                }
            }
        }

        Ok(Self {
            width: width as i32,
            height: rows.len() as i32,
            cells,
        })
    }

    /// Builds an all-free grid of the given dimensions.
    pub fn open(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            cells: vec![CellKind::Free; (width * height) as usize],
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// True iff the cell lies inside the grid bounds.
    pub fn is_valid(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.x < self.width && cell.y >= 0 && cell.y < self.height
    }

    /// True iff the cell is inside the grid and not an obstacle.
    pub fn is_free(&self, cell: Cell) -> bool {
        self.is_valid(cell) && self.cells[(cell.y * self.width + cell.x) as usize] == CellKind::Free
    }

    /// All free cells, in row-major order.
    pub fn free_cells(&self) -> Vec<Cell> {
        let mut free = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                let cell = Cell::new(x, y);
                if self.is_free(cell) {
                    free.push(cell);
                }
            }
        }
        free
    }
}

/// Mutable per-agent state held by the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: AgentId,
    pub pos: Cell,
    pub goal: Cell,
    /// Latches true once `pos == goal`.
    pub at_goal: bool,
    /// Quarantine flag set when post-execution collision handling could not
    /// displace the agent.
    pub collision_stopped: bool,
}

impl AgentState {
    pub fn new(id: AgentId, pos: Cell, goal: Cell) -> Self {
        Self {
            id,
            pos,
            goal,
            at_goal: pos == goal,
            collision_stopped: false,
        }
    }
}

/// The complete world: map, agent roster, and clock.
///
/// Invariants: every agent sits on a free cell inside the grid; agent ids
/// are unique.
#[derive(Debug, Clone)]
pub struct World {
    pub grid: Grid,
    pub agents: Vec<AgentState>,
    pub current_tick: Tick,
}

impl World {
    /// True iff any agent other than `exclude` occupies `cell`.
    pub fn is_occupied(&self, cell: Cell, exclude: Option<AgentId>) -> bool {
        self.agents
            .iter()
            .any(|a| Some(a.id) != exclude && a.pos == cell)
    }
}
