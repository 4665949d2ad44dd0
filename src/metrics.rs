// src/metrics.rs
//
// Per-stream observability. Counters only; the hot path never blocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub detections_seen: Arc<AtomicU64>,
    pub detections_rejected: Arc<AtomicU64>,
    pub tracks_created: Arc<AtomicU64>,
    pub tracks_confirmed: Arc<AtomicU64>,
    pub tracks_pruned: Arc<AtomicU64>,
    pub incidents_opened: Arc<AtomicU64>,
    pub incidents_closed: Arc<AtomicU64>,
    pub gate_eligible: Arc<AtomicU64>,
    pub gate_rejected: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            detections_seen: Arc::new(AtomicU64::new(0)),
            detections_rejected: Arc::new(AtomicU64::new(0)),
            tracks_created: Arc::new(AtomicU64::new(0)),
            tracks_confirmed: Arc::new(AtomicU64::new(0)),
            tracks_pruned: Arc::new(AtomicU64::new(0)),
            incidents_opened: Arc::new(AtomicU64::new(0)),
            incidents_closed: Arc::new(AtomicU64::new(0)),
            gate_eligible: Arc::new(AtomicU64::new(0)),
            gate_rejected: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            detections_seen: self.detections_seen.load(Ordering::Relaxed),
            detections_rejected: self.detections_rejected.load(Ordering::Relaxed),
            tracks_created: self.tracks_created.load(Ordering::Relaxed),
            tracks_confirmed: self.tracks_confirmed.load(Ordering::Relaxed),
            tracks_pruned: self.tracks_pruned.load(Ordering::Relaxed),
            incidents_opened: self.incidents_opened.load(Ordering::Relaxed),
            incidents_closed: self.incidents_closed.load(Ordering::Relaxed),
            gate_eligible: self.gate_eligible.load(Ordering::Relaxed),
            gate_rejected: self.gate_rejected.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub detections_seen: u64,
    pub detections_rejected: u64,
    pub tracks_created: u64,
    pub tracks_confirmed: u64,
    pub tracks_pruned: u64,
    pub incidents_opened: u64,
    pub incidents_closed: u64,
    pub gate_eligible: u64,
    pub gate_rejected: u64,
    pub elapsed_secs: f64,
}
