//! SwarmGrid simulation harness.
//!
//! Everything that drives a run: the seeded lossy network simulator, the
//! file map loader, the per-agent controller state, and the tick
//! orchestrator that sequences the receive / plan / broadcast / validate /
//! deadlock / execute / collide phases.
//!
//! Determinism is the governing constraint: with a fixed seed and
//! configuration, two runs produce bit-identical metrics. All entropy comes
//! from two ChaCha8 streams (world placement and the network), and every
//! phase outside parallel planning iterates agents in insertion order.

pub mod controller;
pub mod map_loader;
pub mod net_sim;
pub mod simulation;

pub use controller::AgentController;
pub use map_loader::FileMapLoader;
pub use net_sim::NetSim;
pub use simulation::{Simulation, SimulationConfig};
