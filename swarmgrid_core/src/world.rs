//! World construction and the world manager.
//!
//! [`WorldBuilder`] assembles a [`World`] from a grid plus either explicit
//! `(start, goal)` pairs or a number of randomly placed agents; every agent
//! must be able to reach its goal over free cells or construction fails.
//! [`WorldManager`] owns the world during a run and answers the occupancy,
//! collision, and termination questions the tick loop asks.

use std::collections::{HashSet, VecDeque};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use crate::types::{AgentId, AgentState, Cell, Grid, Tick, World};

/// Errors raised while parsing a grid or assembling a world.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Grid has no rows or zero-width rows.
    #[error("grid is empty")]
    EmptyGrid,

    /// A grid row differs in width from the first row.
    #[error("inconsistent row width: expected {expected}, got {got}")]
    InconsistentRowWidth { expected: usize, got: usize },

    /// The map alphabet is `.` and `#` only.
    #[error("invalid map character: '{0}'")]
    InvalidCharacter(char),

    /// An explicit start or goal sits on an obstacle or outside the grid.
    #[error("cell {0} is not a free cell")]
    BlockedCell(Cell),

    /// No obstacle-free route exists between an agent's start and goal.
    #[error("goal {goal} is unreachable from start {start}")]
    UnreachableGoal { start: Cell, goal: Cell },

    /// Not enough distinct free cells to place the requested agents.
    #[error("map has too few free cells for {agents} agents ({free} free)")]
    TooFewFreeCells { agents: usize, free: usize },

    /// Random placement ran out of viable (start, goal) pairs.
    #[error("could not place {requested} agents, placed {placed}")]
    PlacementExhausted { requested: usize, placed: usize },
}

/// Builds a [`World`] deterministically from a seed.
pub struct WorldBuilder {
    grid: Option<Grid>,
    agent_specs: Vec<(Cell, Cell)>,
    random_agents: usize,
    rng: ChaCha8Rng,
}

impl WorldBuilder {
    pub fn new(seed: u64) -> Self {
        Self {
            grid: None,
            agent_specs: Vec::new(),
            random_agents: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn with_grid(mut self, grid: Grid) -> Self {
        self.grid = Some(grid);
        self
    }

    /// Adds an agent with an explicit start and goal.
    pub fn with_agent(mut self, start: Cell, goal: Cell) -> Self {
        self.agent_specs.push((start, goal));
        self
    }

    /// Requests `n` agents with randomly chosen starts and goals.
    pub fn with_random_agents(mut self, n: usize) -> Self {
        self.random_agents = n;
        self
    }

    /// Assembles the world, validating reachability for every agent.
    pub fn build(mut self) -> Result<World, WorldError> {
        let grid = self.grid.take().ok_or(WorldError::EmptyGrid)?;
        let mut agents = Vec::new();

        for &(start, goal) in &self.agent_specs {
            if !grid.is_free(start) {
                return Err(WorldError::BlockedCell(start));
            }
            if !grid.is_free(goal) {
                return Err(WorldError::BlockedCell(goal));
            }
            if !is_reachable(&grid, start, goal) {
                return Err(WorldError::UnreachableGoal { start, goal });
            }
            agents.push(AgentState::new(AgentId::from_rng(&mut self.rng), start, goal));
        }

        if self.random_agents > 0 {
            let mut free_cells = grid.free_cells();
            if free_cells.len() < self.random_agents * 2 {
                return Err(WorldError::TooFewFreeCells {
                    agents: self.random_agents,
                    free: free_cells.len(),
                });
            }

            free_cells.shuffle(&mut self.rng);

            let mut used: HashSet<Cell> = HashSet::new();
            for agent in &agents {
                used.insert(agent.pos);
                used.insert(agent.goal);
            }

            // Shuffled first-fit: scan the shuffled deck for the first
            // unused, mutually reachable (start, goal) pair.
            let mut placed = 0;
            for i in 0..free_cells.len() {
                if placed == self.random_agents {
                    break;
                }
                if used.contains(&free_cells[i]) {
                    continue;
                }
                for j in (i + 1)..free_cells.len() {
                    if used.contains(&free_cells[j]) {
                        continue;
                    }
                    if is_reachable(&grid, free_cells[i], free_cells[j]) {
                        used.insert(free_cells[i]);
                        used.insert(free_cells[j]);
                        agents.push(AgentState::new(
                            AgentId::from_rng(&mut self.rng),
                            free_cells[i],
                            free_cells[j],
                        ));
                        placed += 1;
                        break;
                    }
                }
            }

            if placed < self.random_agents {
                return Err(WorldError::PlacementExhausted {
                    requested: self.random_agents,
                    placed,
                });
            }
        }

        Ok(World {
            grid,
            agents,
            current_tick: 0,
        })
    }
}

/// Purely spatial BFS over free cells.
fn is_reachable(grid: &Grid, start: Cell, goal: Cell) -> bool {
    if !grid.is_free(start) || !grid.is_free(goal) {
        return false;
    }

    let mut frontier = VecDeque::new();
    let mut visited = HashSet::new();
    frontier.push_back(start);
    visited.insert(start);

    while let Some(current) = frontier.pop_front() {
        if current == goal {
            return true;
        }
        for next in current.cardinal_neighbors() {
            if grid.is_free(next) && visited.insert(next) {
                frontier.push_back(next);
            }
        }
    }

    false
}

/// Owns the [`World`] during a run and mediates all mutation.
pub struct WorldManager {
    world: World,
}

impl WorldManager {
    pub fn new(world: World) -> Self {
        Self { world }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn current_tick(&self) -> Tick {
        self.world.current_tick
    }

    pub fn advance_tick(&mut self) {
        self.world.current_tick += 1;
    }

    pub fn agent(&self, id: AgentId) -> Option<&AgentState> {
        self.world.agents.iter().find(|a| a.id == id)
    }

    pub fn agent_position(&self, id: AgentId) -> Option<Cell> {
        self.agent(id).map(|a| a.pos)
    }

    /// Moves an agent if the target is in bounds, free, and unoccupied;
    /// latches `at_goal` when the target is the agent's goal.
    pub fn move_agent(&mut self, id: AgentId, to: Cell) -> bool {
        if !self.world.grid.is_free(to) || self.world.is_occupied(to, Some(id)) {
            return false;
        }
        let Some(agent) = self.world.agents.iter_mut().find(|a| a.id == id) else {
            return false;
        };
        agent.pos = to;
        if agent.pos == agent.goal {
            agent.at_goal = true;
        }
        true
    }

    /// Phase-E move: bounds and obstacle check only. Occupancy is NOT
    /// checked; simultaneous execution may overlap agents, and the
    /// post-execution collision pass owns that case.
    pub fn force_move(&mut self, id: AgentId, to: Cell) -> bool {
        if !self.world.grid.is_free(to) {
            return false;
        }
        let Some(agent) = self.world.agents.iter_mut().find(|a| a.id == id) else {
            return false;
        };
        agent.pos = to;
        if agent.pos == agent.goal {
            agent.at_goal = true;
        }
        true
    }

    /// Clears a goal latch that no longer matches the agent's cell. Used
    /// after collision displacement moves an agent off a goal it had only
    /// entered through an overlapping move.
    pub fn unlatch_goal_if_departed(&mut self, id: AgentId) {
        if let Some(agent) = self.world.agents.iter_mut().find(|a| a.id == id) {
            if agent.pos != agent.goal {
                agent.at_goal = false;
            }
        }
    }

    pub fn set_collision_stopped(&mut self, id: AgentId, stopped: bool) {
        if let Some(agent) = self.world.agents.iter_mut().find(|a| a.id == id) {
            agent.collision_stopped = stopped;
        }
    }

    /// Ids of all agents sharing a cell with at least one other agent,
    /// in agent-insertion order.
    pub fn detect_collisions(&self) -> Vec<AgentId> {
        self.world
            .agents
            .iter()
            .filter(|a| {
                self.world
                    .agents
                    .iter()
                    .any(|b| b.id != a.id && b.pos == a.pos)
            })
            .map(|a| a.id)
            .collect()
    }

    pub fn count_active(&self) -> usize {
        self.world.agents.iter().filter(|a| !a.at_goal).count()
    }

    pub fn all_at_goal(&self) -> bool {
        self.world.agents.iter().all(|a| a.at_goal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_world(width: i32, height: i32, pairs: &[(Cell, Cell)]) -> World {
        let mut builder = WorldBuilder::new(1).with_grid(Grid::open(width, height));
        for &(s, g) in pairs {
            builder = builder.with_agent(s, g);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_builder_explicit_agents() {
        let world = open_world(5, 5, &[(Cell::new(0, 0), Cell::new(4, 4))]);
        assert_eq!(world.agents.len(), 1);
        assert_eq!(world.agents[0].pos, Cell::new(0, 0));
        assert_eq!(world.agents[0].goal, Cell::new(4, 4));
        assert!(!world.agents[0].at_goal);
    }

    #[test]
    fn test_builder_rejects_blocked_start() {
        let grid = Grid::from_ascii(&["#.", ".."]).unwrap();
        let err = WorldBuilder::new(1)
            .with_grid(grid)
            .with_agent(Cell::new(0, 0), Cell::new(1, 1))
            .build()
            .unwrap_err();
        assert!(matches!(err, WorldError::BlockedCell(_)));
    }

    #[test]
    fn test_builder_rejects_unreachable_goal() {
        // Wall splits the map in two.
        let grid = Grid::from_ascii(&[".#.", ".#.", ".#."]).unwrap();
        let err = WorldBuilder::new(1)
            .with_grid(grid)
            .with_agent(Cell::new(0, 0), Cell::new(2, 0))
            .build()
            .unwrap_err();
        assert!(matches!(err, WorldError::UnreachableGoal { .. }));
    }

    #[test]
    fn test_builder_random_agents_unique_cells() {
        let world = WorldBuilder::new(99)
            .with_grid(Grid::open(6, 6))
            .with_random_agents(4)
            .build()
            .unwrap();

        assert_eq!(world.agents.len(), 4);
        let mut cells = HashSet::new();
        for agent in &world.agents {
            assert!(cells.insert(agent.pos), "duplicate start {}", agent.pos);
            assert!(cells.insert(agent.goal), "duplicate goal {}", agent.goal);
        }
    }

    #[test]
    fn test_builder_random_agents_deterministic() {
        let build = || {
            WorldBuilder::new(1234)
                .with_grid(Grid::open(8, 6))
                .with_random_agents(3)
                .build()
                .unwrap()
        };
        let a = build();
        let b = build();
        for (x, y) in a.agents.iter().zip(b.agents.iter()) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.pos, y.pos);
            assert_eq!(x.goal, y.goal);
        }
    }

    #[test]
    fn test_builder_too_few_free_cells() {
        let err = WorldBuilder::new(1)
            .with_grid(Grid::open(2, 1))
            .with_random_agents(2)
            .build()
            .unwrap_err();
        assert!(matches!(err, WorldError::TooFewFreeCells { .. }));
    }

    #[test]
    fn test_move_agent_validity() {
        let grid = Grid::from_ascii(&["..#", "..."]).unwrap();
        let world = WorldBuilder::new(1)
            .with_grid(grid)
            .with_agent(Cell::new(0, 0), Cell::new(2, 1))
            .build()
            .unwrap();
        let id = world.agents[0].id;
        let mut manager = WorldManager::new(world);

        assert!(!manager.move_agent(id, Cell::new(2, 0))); // obstacle
        assert!(!manager.move_agent(id, Cell::new(-1, 0))); // out of bounds
        assert!(manager.move_agent(id, Cell::new(1, 0)));
        assert_eq!(manager.agent_position(id), Some(Cell::new(1, 0)));
    }

    #[test]
    fn test_move_agent_rejects_occupied() {
        let world = open_world(
            3,
            1,
            &[
                (Cell::new(0, 0), Cell::new(2, 0)),
                (Cell::new(1, 0), Cell::new(0, 0)),
            ],
        );
        let id = world.agents[0].id;
        let mut manager = WorldManager::new(world);
        assert!(!manager.move_agent(id, Cell::new(1, 0)));
    }

    #[test]
    fn test_move_agent_latches_at_goal() {
        let world = open_world(3, 1, &[(Cell::new(0, 0), Cell::new(1, 0))]);
        let id = world.agents[0].id;
        let mut manager = WorldManager::new(world);
        assert!(manager.move_agent(id, Cell::new(1, 0)));
        assert!(manager.agent(id).unwrap().at_goal);
        assert!(manager.all_at_goal());
        assert_eq!(manager.count_active(), 0);
    }

    #[test]
    fn test_force_move_permits_overlap() {
        let world = open_world(
            3,
            1,
            &[
                (Cell::new(0, 0), Cell::new(2, 0)),
                (Cell::new(1, 0), Cell::new(0, 0)),
            ],
        );
        let id = world.agents[0].id;
        let mut manager = WorldManager::new(world);
        assert!(manager.force_move(id, Cell::new(1, 0)));
        assert_eq!(manager.detect_collisions().len(), 2);
    }

    #[test]
    fn test_detect_collisions_empty_when_distinct() {
        let world = open_world(
            3,
            3,
            &[
                (Cell::new(0, 0), Cell::new(2, 2)),
                (Cell::new(1, 0), Cell::new(0, 2)),
            ],
        );
        let manager = WorldManager::new(world);
        assert!(manager.detect_collisions().is_empty());
    }
}
