//! Errors raised by the environment layer.

use thiserror::Error;

use swarmgrid_core::WorldError;

/// Errors that can occur while loading a map and placing agents on it.
#[derive(Debug, Error)]
pub enum MapError {
    /// The map file could not be read.
    #[error("failed to read map file: {0}")]
    Io(#[from] std::io::Error),

    /// The file parsed but held no grid rows.
    #[error("map file contains no grid rows")]
    Empty,

    /// Neither a pre-built world nor a map loader was configured.
    #[error("no world or map loader configured")]
    MissingSource,

    /// Fewer than two free cells: nowhere to put an agent and a goal.
    #[error("map has only {0} free cells (need at least 2)")]
    TooFewFreeCells(usize),

    /// Grid parsing or world assembly failed.
    #[error(transparent)]
    World(#[from] WorldError),
}
