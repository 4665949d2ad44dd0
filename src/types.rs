// src/types.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::gatekeeper::GateConfig;
use crate::rules::RulesConfig;
use crate::tracker::TrackerConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub zones: Vec<Zone>,
    pub tracker: TrackerConfig,
    pub rules: RulesConfig,
    pub gate: GateConfig,
    pub replay: ReplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Directory scanned for `.jsonl` capture files (one frame per line)
    pub input_dir: String,
    /// When non-empty, closed incidents are appended here as JSON lines
    pub output_dir: String,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            input_dir: "captures".to_string(),
            output_dir: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Axis-aligned bounding box in pixels, `(x, y)` = top-left corner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BBox {
    pub fn centroid(&self) -> (f32, f32) {
        (self.x + self.w * 0.5, self.y + self.h * 0.5)
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    /// Degenerate boxes (non-positive extent, non-finite coordinates) are
    /// rejected at the tracker boundary rather than tracked.
    pub fn is_valid(&self) -> bool {
        self.w > 0.0
            && self.h > 0.0
            && self.x.is_finite()
            && self.y.is_finite()
            && self.w.is_finite()
            && self.h.is_finite()
    }
}

/// One per-frame observation of one physical object. `track_id` is assigned
/// by the upstream detector/associator and assumed stable; this core never
/// invents or merges identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub track_id: u64,
    pub class_label: String,
    pub confidence: f32,
    pub bbox: BBox,
}

impl Detection {
    pub fn centroid(&self) -> (f32, f32) {
        self.bbox.centroid()
    }

    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence) && self.bbox.is_valid()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Restricted,
    Monitored,
    Public,
    Private,
}

/// Named polygon with a type tag. Immutable for the lifetime of a run;
/// owned by configuration, read-only to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub kind: ZoneKind,
    /// Ordered vertices, at least 3. Validated at config load.
    pub polygon: Vec<[f32; 2]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Closed,
}

/// A bounded time interval during which one track continuously satisfied at
/// least one rule. A track that stops triggering and later re-triggers gets
/// a new incident with a new id, never a reopened one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub incident_id: u64,
    pub track_id: u64,
    pub class_label: String,
    pub triggered_rules: Vec<String>,
    pub reason: String,
    pub start_time: f64,
    pub last_time: f64,
    pub end_time: Option<f64>,
    pub duration_seconds: f64,
    pub max_confidence: f32,
    /// Accumulated dwell seconds per zone, snapshotted from the track
    pub zone_presence: BTreeMap<String, f64>,
    pub status: IncidentStatus,
}

/// Eligibility decision for downstream use of a detection snapshot.
/// Derived per evaluation call, never persisted as a top-level entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateScore {
    pub vision_conf: f32,
    pub rule_conf: f32,
    pub combined_conf: f32,
    pub eligible: bool,
    pub privacy_risk: bool,
    pub reason: String,
}
