//! Simulated broadcast network with probabilistic drop and latency.
//!
//! One seeded ChaCha8 stream drives both fault decisions: the Bernoulli
//! drop trial first, then (for surviving messages) a normal latency sample.
//! Surviving messages fan out on enqueue to a min-heap per registered
//! receiver, so a broadcast reaches every agent except its sender at the
//! same delivery tick.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Mutex;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use swarmgrid_core::{AgentId, Tick};
use swarmgrid_env::{Message, Network, NetworkParams, NetworkStats};

/// One simulated tick spans this many milliseconds of latency.
const MS_PER_TICK: f64 = 100.0;

#[derive(Debug)]
struct QueuedMessage {
    delivery_tick: Tick,
    /// Global enqueue sequence, the deterministic tie-break for messages
    /// delivered on the same tick.
    seq: u64,
    msg: Message,
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.delivery_tick == other.delivery_tick && self.seq == other.seq
    }
}

impl Eq for QueuedMessage {}

impl Ord for QueuedMessage {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.delivery_tick, self.seq).cmp(&(other.delivery_tick, other.seq))
    }
}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct NetSimInner {
    params: NetworkParams,
    rng: ChaCha8Rng,
    latency_dist: Option<Normal<f64>>,
    queues: HashMap<AgentId, BinaryHeap<Reverse<QueuedMessage>>>,
    next_seq: u64,
    sent: u64,
    dropped: u64,
}

/// The simulated network. Shared by handle; all state sits behind one
/// mutex guarding both the send and receive paths.
pub struct NetSim {
    inner: Mutex<NetSimInner>,
}

impl NetSim {
    pub fn new(params: NetworkParams, seed: u64) -> Self {
        let latency_dist = if params.mean_latency_ms == 0 && params.jitter_ms == 0 {
            None
        } else {
            Some(
                Normal::new(params.mean_latency_ms as f64, params.jitter_ms as f64)
                    .expect("latency parameters are finite and non-negative"),
            )
        };

        Self {
            inner: Mutex::new(NetSimInner {
                params,
                rng: ChaCha8Rng::seed_from_u64(seed),
                latency_dist,
                queues: HashMap::new(),
                next_seq: 0,
                sent: 0,
                dropped: 0,
            }),
        }
    }

    /// Adds an agent to the broadcast roster. Receivers are also enrolled
    /// on their first `receive` call; messages sent before enrollment are
    /// not replayed to late joiners. The tick loop receives for every agent
    /// before the first broadcast, so in a run nothing is ever missed.
    pub fn register_agent(&self, id: AgentId) {
        let mut inner = self.inner.lock().unwrap();
        inner.queues.entry(id).or_default();
    }
}

impl NetSimInner {
    fn delivery_tick(&mut self, send_tick: Tick) -> Tick {
        match self.latency_dist {
            // Zero-config fast path: next-tick delivery, no sample drawn.
            None => send_tick + 1,
            Some(dist) => {
                let latency_ms = dist.sample(&mut self.rng).max(0.0);
                send_tick + (latency_ms / MS_PER_TICK) as Tick + 1
            }
        }
    }
}

impl Network for NetSim {
    fn send(&self, msg: Message) {
        let mut inner = self.inner.lock().unwrap();
        inner.sent += 1;

        if inner.rng.gen::<f64>() < inner.params.drop_probability {
            inner.dropped += 1;
            return;
        }

        let delivery_tick = inner.delivery_tick(msg.timestamp);
        let seq = inner.next_seq;
        inner.next_seq += 1;

        // Fan out to every registered receiver except the sender; all
        // copies share the one delivery tick sampled above.
        let sender = msg.from;
        for (receiver, queue) in inner.queues.iter_mut() {
            if *receiver != sender {
                queue.push(Reverse(QueuedMessage {
                    delivery_tick,
                    seq,
                    msg: msg.clone(),
                }));
            }
        }
    }

    fn receive(&self, agent_id: AgentId, current_tick: Tick) -> Vec<Message> {
        let mut inner = self.inner.lock().unwrap();
        let queue = inner.queues.entry(agent_id).or_default();

        let mut ready = Vec::new();
        while let Some(Reverse(queued)) = queue.pop() {
            if queued.delivery_tick > current_tick {
                queue.push(Reverse(queued));
                break;
            }
            ready.push(queued.msg);
        }
        ready
    }

    fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        for queue in inner.queues.values_mut() {
            queue.clear();
        }
        inner.sent = 0;
        inner.dropped = 0;
        inner.next_seq = 0;
    }

    fn get_stats(&self) -> NetworkStats {
        let inner = self.inner.lock().unwrap();
        NetworkStats {
            sent: inner.sent,
            dropped: inner.dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use swarmgrid_core::Cell;
    use swarmgrid_env::MessageKind;

    fn announcement(from: AgentId, tick: Tick) -> Message {
        Message {
            from,
            kind: MessageKind::PathAnnouncement,
            next: Cell::new(0, 0),
            timestamp: tick,
            planned_path: vec![Cell::new(0, 0)],
            sequence_number: 0,
            vector_clock: StdHashMap::new(),
            full_state: None,
        }
    }

    fn lossless_net(ids: &[AgentId]) -> NetSim {
        let net = NetSim::new(NetworkParams::lossless(), 7);
        for &id in ids {
            net.register_agent(id);
        }
        net
    }

    #[test]
    fn test_zero_latency_delivers_next_tick() {
        let a = AgentId::from_seed(1);
        let b = AgentId::from_seed(2);
        let net = lossless_net(&[a, b]);

        net.send(announcement(a, 0));

        assert!(net.receive(b, 0).is_empty(), "not before send_tick + 1");
        let delivered = net.receive(b, 1);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].from, a);
    }

    #[test]
    fn test_no_self_delivery() {
        let a = AgentId::from_seed(1);
        let b = AgentId::from_seed(2);
        let net = lossless_net(&[a, b]);

        net.send(announcement(a, 0));
        assert!(net.receive(a, 5).is_empty());
    }

    #[test]
    fn test_broadcast_reaches_all_receivers() {
        let a = AgentId::from_seed(1);
        let b = AgentId::from_seed(2);
        let c = AgentId::from_seed(3);
        let net = lossless_net(&[a, b, c]);

        net.send(announcement(a, 0));
        assert_eq!(net.receive(b, 1).len(), 1);
        assert_eq!(net.receive(c, 1).len(), 1);
    }

    #[test]
    fn test_no_redelivery() {
        let a = AgentId::from_seed(1);
        let b = AgentId::from_seed(2);
        let net = lossless_net(&[a, b]);

        net.send(announcement(a, 0));
        assert_eq!(net.receive(b, 1).len(), 1);
        assert!(net.receive(b, 1).is_empty());
        assert!(net.receive(b, 2).is_empty());
    }

    #[test]
    fn test_late_receive_still_delivers() {
        let a = AgentId::from_seed(1);
        let b = AgentId::from_seed(2);
        let net = lossless_net(&[a, b]);

        net.send(announcement(a, 0));
        // No receive happened at tick 1; the first later call picks it up.
        assert_eq!(net.receive(b, 10).len(), 1);
    }

    #[test]
    fn test_full_drop_discards_everything() {
        let a = AgentId::from_seed(1);
        let b = AgentId::from_seed(2);
        let params = NetworkParams {
            drop_probability: 1.0,
            mean_latency_ms: 0,
            jitter_ms: 0,
        };
        let net = NetSim::new(params, 7);
        net.register_agent(a);
        net.register_agent(b);

        for tick in 0..20 {
            net.send(announcement(a, tick));
        }

        assert!(net.receive(b, 100).is_empty());
        assert_eq!(net.get_stats(), NetworkStats { sent: 20, dropped: 20 });
    }

    #[test]
    fn test_latency_pushes_delivery_out() {
        let a = AgentId::from_seed(1);
        let b = AgentId::from_seed(2);
        // 300 ms mean, no jitter: floor(300/100) + 1 = 4 ticks out.
        let params = NetworkParams {
            drop_probability: 0.0,
            mean_latency_ms: 300,
            jitter_ms: 0,
        };
        let net = NetSim::new(params, 7);
        net.register_agent(a);
        net.register_agent(b);

        net.send(announcement(a, 2));
        assert!(net.receive(b, 5).is_empty());
        assert_eq!(net.receive(b, 6).len(), 1);
    }

    #[test]
    fn test_deterministic_with_fixed_seed() {
        let a = AgentId::from_seed(1);
        let b = AgentId::from_seed(2);
        let params = NetworkParams {
            drop_probability: 0.3,
            mean_latency_ms: 50,
            jitter_ms: 20,
        };

        let run = || {
            let net = NetSim::new(params, 555);
            net.register_agent(a);
            net.register_agent(b);
            let mut delivery_counts = Vec::new();
            for tick in 0..30 {
                net.send(announcement(a, tick));
                delivery_counts.push(net.receive(b, tick).len());
            }
            (delivery_counts, net.get_stats())
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_reset_clears_queues_and_counters() {
        let a = AgentId::from_seed(1);
        let b = AgentId::from_seed(2);
        let net = lossless_net(&[a, b]);

        net.send(announcement(a, 0));
        net.reset();

        assert!(net.receive(b, 10).is_empty());
        assert_eq!(net.get_stats(), NetworkStats::default());
    }
}
