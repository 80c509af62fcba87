//! The map loading port.

use std::path::Path;

use swarmgrid_core::World;

use crate::error::MapError;

/// Loads a grid from disk and populates it with randomly placed agents.
pub trait MapLoader {
    /// Returns a fully constructed world: grid parsed and validated,
    /// `n_agents` agents placed with mutually reachable starts and goals,
    /// everything derived deterministically from `seed`.
    fn load(&self, path: &Path, n_agents: usize, seed: u64) -> Result<World, MapError>;
}
