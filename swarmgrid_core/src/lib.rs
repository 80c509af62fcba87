//! SwarmGrid core domain model.
//!
//! The pure heart of the coordinator: the grid world and its agents, the
//! spatial-temporal reservation table, the cooperative A* planner, and the
//! run metrics. Everything here is deterministic: the only entropy source
//! is the seed handed to [`WorldBuilder`].
//!
//! The network substrate, the per-agent controllers, and the tick
//! orchestrator live in `swarmgrid_sim`; the port traits they implement are
//! in `swarmgrid_env`.

pub mod metrics;
pub mod planner;
pub mod reservation;
pub mod types;
pub mod world;

pub use metrics::{emit_metrics_json, emit_trace_csv, MetricsCollector, MetricsSnapshot, TickTrace};
pub use planner::{PathPlanner, GOAL_HOLD_TICKS};
pub use reservation::{ReservationEntry, ReservationKey, ReservationTable};
pub use types::{AgentId, AgentState, Cell, CellKind, Grid, Path, Tick, World};
pub use world::{WorldBuilder, WorldError, WorldManager};
