//! Run metrics: counters, per-tick traces, and the JSON/CSV emitters.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path as FsPath;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::types::{AgentId, Cell, Tick};

/// Point-in-time view of a run's metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_messages: u64,
    pub dropped_messages: u64,
    pub total_replans: u64,
    pub makespan: Tick,
    pub collision_detected: bool,
    pub wall_time_ms: u64,
    /// Fraction of sent messages dropped, rounded to 4 decimals.
    pub drop_rate: f64,
}

/// One tick's worth of trace data.
#[derive(Debug, Clone)]
pub struct TickTrace {
    pub tick: Tick,
    pub agent_positions: Vec<(AgentId, Cell)>,
    pub active_agents: usize,
    pub messages_sent: u64,
}

/// Accumulates counters and traces over a run.
///
/// Counter updates are atomic so the parallel planning phase can record
/// replans concurrently; the trace vector takes a lock.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    total_messages: AtomicU64,
    dropped_messages: AtomicU64,
    total_replans: AtomicU64,
    collision_detected: AtomicBool,
    makespan: AtomicU64,
    traces: Mutex<Vec<TickTrace>>,
    start_time: Mutex<Option<Instant>>,
    wall_time: Mutex<Duration>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_message_sent(&self) {
        self.total_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replan(&self) {
        self.total_replans.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_collision(&self) {
        self.collision_detected.store(true, Ordering::Relaxed);
    }

    pub fn set_makespan(&self, makespan: Tick) {
        self.makespan.store(makespan, Ordering::Relaxed);
    }

    /// Overwrites the dropped-message total from the network's own count at
    /// the end of a run; the simulator is the source of truth for drops.
    pub fn set_dropped_messages(&self, dropped: u64) {
        self.dropped_messages.store(dropped, Ordering::Relaxed);
    }

    pub fn record_tick_trace(&self, trace: TickTrace) {
        self.traces.lock().unwrap().push(trace);
    }

    pub fn start_timer(&self) {
        *self.start_time.lock().unwrap() = Some(Instant::now());
    }

    pub fn stop_timer(&self) {
        let started = self.start_time.lock().unwrap().take();
        if let Some(started) = started {
            *self.wall_time.lock().unwrap() = started.elapsed();
        }
    }

    pub fn total_replans(&self) -> u64 {
        self.total_replans.load(Ordering::Relaxed)
    }

    pub fn collision_detected(&self) -> bool {
        self.collision_detected.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_messages.load(Ordering::Relaxed);
        let dropped = self.dropped_messages.load(Ordering::Relaxed);
        let drop_rate = if total > 0 {
            let raw = dropped as f64 / total as f64;
            (raw * 10_000.0).round() / 10_000.0
        } else {
            0.0
        };

        MetricsSnapshot {
            total_messages: total,
            dropped_messages: dropped,
            total_replans: self.total_replans.load(Ordering::Relaxed),
            makespan: self.makespan.load(Ordering::Relaxed),
            collision_detected: self.collision_detected.load(Ordering::Relaxed),
            wall_time_ms: self.wall_time.lock().unwrap().as_millis() as u64,
            drop_rate,
        }
    }

    pub fn traces(&self) -> Vec<TickTrace> {
        self.traces.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.total_messages.store(0, Ordering::Relaxed);
        self.dropped_messages.store(0, Ordering::Relaxed);
        self.total_replans.store(0, Ordering::Relaxed);
        self.collision_detected.store(false, Ordering::Relaxed);
        self.makespan.store(0, Ordering::Relaxed);
        self.traces.lock().unwrap().clear();
        *self.start_time.lock().unwrap() = None;
        *self.wall_time.lock().unwrap() = Duration::ZERO;
    }
}

/// Writes the metrics snapshot as pretty-printed JSON.
pub fn emit_metrics_json(path: &FsPath, snapshot: &MetricsSnapshot) -> std::io::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), snapshot)?;
    Ok(())
}

/// Writes the per-tick trace as CSV, one row per `(tick, agent)` in agent
/// insertion order.
pub fn emit_trace_csv(path: &FsPath, traces: &[TickTrace]) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "tick,agent_id,x,y,active_agents,messages_sent")?;
    for trace in traces {
        for (agent_id, pos) in &trace.agent_positions {
            writeln!(
                writer,
                "{},{},{},{},{},{}",
                trace.tick,
                agent_id.as_uuid(),
                pos.x,
                pos.y,
                trace.active_agents,
                trace.messages_sent
            )?;
        }
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = MetricsCollector::new();
        metrics.record_message_sent();
        metrics.record_message_sent();
        metrics.record_replan();
        metrics.set_dropped_messages(1);
        metrics.set_makespan(17);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_messages, 2);
        assert_eq!(snapshot.dropped_messages, 1);
        assert_eq!(snapshot.total_replans, 1);
        assert_eq!(snapshot.makespan, 17);
        assert!(!snapshot.collision_detected);
        assert!((snapshot.drop_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_drop_rate_rounded_to_four_decimals() {
        let metrics = MetricsCollector::new();
        for _ in 0..3 {
            metrics.record_message_sent();
        }
        metrics.set_dropped_messages(1);
        // 1/3 = 0.3333...
        assert!((metrics.snapshot().drop_rate - 0.3333).abs() < 1e-9);
    }

    #[test]
    fn test_collision_latches() {
        let metrics = MetricsCollector::new();
        assert!(!metrics.collision_detected());
        metrics.record_collision();
        metrics.record_collision();
        assert!(metrics.collision_detected());
    }

    #[test]
    fn test_reset() {
        let metrics = MetricsCollector::new();
        metrics.record_message_sent();
        metrics.record_replan();
        metrics.record_collision();
        metrics.record_tick_trace(TickTrace {
            tick: 0,
            agent_positions: vec![],
            active_agents: 0,
            messages_sent: 0,
        });

        metrics.reset();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_messages, 0);
        assert_eq!(snapshot.total_replans, 0);
        assert!(!snapshot.collision_detected);
        assert!(metrics.traces().is_empty());
    }

    #[test]
    fn test_emit_metrics_json_fields() {
        let metrics = MetricsCollector::new();
        metrics.record_message_sent();
        metrics.set_makespan(3);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        emit_metrics_json(&path, &metrics.snapshot()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["total_messages"], 1);
        assert_eq!(value["makespan"], 3);
        assert_eq!(value["collision_detected"], false);
        assert!(value["drop_rate"].is_number());
        assert!(value["wall_time_ms"].is_number());
    }

    #[test]
    fn test_emit_trace_csv_rows() {
        use crate::types::AgentId;

        let a = AgentId::from_seed(1);
        let b = AgentId::from_seed(2);
        let traces = vec![TickTrace {
            tick: 4,
            agent_positions: vec![(a, Cell::new(1, 2)), (b, Cell::new(3, 0))],
            active_agents: 2,
            messages_sent: 6,
        }];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        emit_trace_csv(&path, &traces).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "tick,agent_id,x,y,active_agents,messages_sent"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("4,"));
        assert!(row.ends_with(",1,2,2,6"));
        assert_eq!(lines.count(), 1);
    }
}
