// src/lib.rs
//
// Security incident detection core.
//
// Signal flow, one frame at a time:
//   Detections → tracker → rules → incidents ─→ FrameOutput
//   Detections + zone hits → gatekeeper ───────┘
//
// One FramePipeline per camera stream; no shared mutable state between
// streams. The object detector, persistence and alerting layers are
// external collaborators — this crate only does semantic state over an
// identity-stable detection stream.

pub mod config;
pub mod gatekeeper;
pub mod identity;
pub mod incidents;
pub mod metrics;
pub mod pipeline;
pub mod rules;
pub mod tracker;
pub mod types;
pub mod zones;

// Re-exports for ergonomic access from main.rs and downstream callers
pub use gatekeeper::{GateConfig, GateInput, GatekeeperScorer, PrivacyConfig};
pub use identity::{IdentityResolver, UpstreamIdentity};
pub use incidents::{FrameIncidents, IncidentManager, IncidentSink, TriggerState};
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use pipeline::{FrameOutput, FramePipeline};
pub use rules::{RuleEvaluator, RulesConfig};
pub use tracker::{Tracker, TrackerConfig, TrackState};
pub use types::{BBox, Config, Detection, GateScore, Incident, IncidentStatus, Zone, ZoneKind};
pub use zones::ZoneIndex;
