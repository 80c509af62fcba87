//! File-backed map loading.
//!
//! Map files are UTF-8 text: `.` for free cells, `#` for obstacles, lines
//! starting with `/` are comments, blank lines are skipped, and every
//! remaining line (after trimming) must have the same width.

use std::fs;
use std::path::Path;

use tracing::info;

use swarmgrid_core::{Grid, World, WorldBuilder};
use swarmgrid_env::{MapError, MapLoader};

/// Loads grids from map files and populates them with random agents.
#[derive(Debug, Default)]
pub struct FileMapLoader;

impl FileMapLoader {
    pub fn new() -> Self {
        Self
    }

    fn parse_grid(text: &str) -> Result<Grid, MapError> {
        // Comment and blank detection looks at the raw line; only the
        // survivors are trimmed. An indented `/` is not a comment marker
        // and surfaces as an invalid map character.
        let rows: Vec<&str> = text
            .lines()
            .filter(|line| !line.is_empty() && !line.starts_with('/'))
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        if rows.is_empty() {
            return Err(MapError::Empty);
        }

        let grid = Grid::from_ascii(&rows)?;

        let free = grid.free_cells().len();
        if free < 2 {
            return Err(MapError::TooFewFreeCells(free));
        }

        Ok(grid)
    }
}

impl MapLoader for FileMapLoader {
    fn load(&self, path: &Path, n_agents: usize, seed: u64) -> Result<World, MapError> {
        let text = fs::read_to_string(path)?;
        let grid = Self::parse_grid(&text)?;

        info!(
            "loaded map {}x{} from {}",
            grid.width(),
            grid.height(),
            path.display()
        );

        let world = WorldBuilder::new(seed)
            .with_grid(grid)
            .with_random_agents(n_agents)
            .build()?;

        info!("created world with {} agents", world.agents.len());
        Ok(world)
    }
}
