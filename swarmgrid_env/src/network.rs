//! The broadcast network port.

use swarmgrid_core::{AgentId, Tick};

use crate::message::Message;

/// Tunable fault parameters for a network implementation.
#[derive(Debug, Clone, Copy)]
pub struct NetworkParams {
    /// Probability in `[0, 1]` that a sent message is silently dropped.
    pub drop_probability: f64,
    /// Mean one-way latency in milliseconds.
    pub mean_latency_ms: u32,
    /// Standard deviation of the latency in milliseconds.
    pub jitter_ms: u32,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            drop_probability: 0.05,
            mean_latency_ms: 40,
            jitter_ms: 10,
        }
    }
}

impl NetworkParams {
    /// Instant, lossless delivery (messages still arrive on the next tick).
    pub fn lossless() -> Self {
        Self {
            drop_probability: 0.0,
            mean_latency_ms: 0,
            jitter_ms: 0,
        }
    }
}

/// Send/drop counters reported by a network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub sent: u64,
    pub dropped: u64,
}

/// A lossy, latent broadcast channel.
///
/// `send` enqueues a message toward every other agent; `receive` drains
/// everything due for one agent at the given tick. A message sent at tick
/// `t` is never deliverable before `t + 1`, own broadcasts are never
/// returned to their sender, and nothing is delivered twice.
///
/// Methods take `&self`: implementations guard their queues internally so
/// the orchestrator can hold one shared handle.
pub trait Network: Send + Sync {
    fn send(&self, msg: Message);

    fn receive(&self, agent_id: AgentId, current_tick: Tick) -> Vec<Message>;

    /// Clears all queued messages and zeroes the counters.
    fn reset(&self);

    fn get_stats(&self) -> NetworkStats;
}
