//! SwarmGrid environment abstraction.
//!
//! The seams between the core and the outside world: the broadcast
//! [`Network`] port, the [`MapLoader`] port, and the [`Message`] model the
//! agents exchange. The tick orchestrator programs exclusively against
//! these traits; `swarmgrid_sim` provides the simulated implementations.

pub mod error;
pub mod map_loader;
pub mod message;
pub mod network;

pub use error::MapError;
pub use map_loader::MapLoader;
pub use message::{Message, MessageKind};
pub use network::{Network, NetworkParams, NetworkStats};
