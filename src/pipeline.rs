// src/pipeline.rs
//
// Orchestrator that wires together the tracker, rule evaluator, incident
// manager and gatekeeper scorer for one camera stream.
//
// Single entry point: call process_frame() each frame, in timestamp
// order. Processing is synchronous and single-threaded per stream; run
// one FramePipeline per camera for parallelism. There is no ambient
// global state — every pipeline owns its world.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::debug;

use crate::gatekeeper::{GateInput, GatekeeperScorer};
use crate::incidents::{IncidentManager, IncidentSink, TriggerState};
use crate::metrics::PipelineMetrics;
use crate::rules::RuleEvaluator;
use crate::tracker::{TrackState, Tracker};
use crate::types::{Config, Detection, GateScore, Incident};
use crate::zones::ZoneIndex;

/// Everything one frame produced, as snapshot copies. Mutating the output
/// cannot reach back into pipeline state.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    /// Confirmed tracks, ascending track_id
    pub tracks: Vec<TrackState>,
    /// track_id → triggered rule names, fixed evaluation order
    pub triggered: BTreeMap<u64, Vec<String>>,
    pub opened: Vec<Incident>,
    pub updated: Vec<Incident>,
    pub closed: Vec<Incident>,
    pub gate: GateScore,
}

pub struct FramePipeline {
    zones: ZoneIndex,
    tracker: Tracker,
    evaluator: RuleEvaluator,
    incidents: IncidentManager,
    gatekeeper: GatekeeperScorer,
    pub metrics: PipelineMetrics,
}

impl FramePipeline {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            zones: ZoneIndex::new(config.zones.clone())?,
            tracker: Tracker::new(config.tracker.clone()),
            evaluator: RuleEvaluator::new(config.rules.clone()),
            incidents: IncidentManager::new(),
            gatekeeper: GatekeeperScorer::new(config.gate.clone()),
            metrics: PipelineMetrics::new(),
        })
    }

    /// Register a sink that receives every closed incident.
    pub fn set_incident_sink(&mut self, sink: Box<dyn IncidentSink + Send>) {
        self.incidents.set_sink(sink);
    }

    pub fn zones(&self) -> &ZoneIndex {
        &self.zones
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Process one frame: tracker → rules → incidents → gate, in that
    /// fixed order. Timestamps must be monotonically non-decreasing.
    pub fn process_frame(&mut self, detections: &[Detection], timestamp: f64) -> FrameOutput {
        self.metrics.inc(&self.metrics.total_frames);
        self.metrics
            .add(&self.metrics.detections_seen, detections.len() as u64);

        let stats = self.tracker.update(detections, &self.zones, timestamp);
        self.metrics
            .add(&self.metrics.detections_rejected, stats.rejected);
        self.metrics.add(&self.metrics.tracks_created, stats.created);
        self.metrics
            .add(&self.metrics.tracks_confirmed, stats.confirmed);
        self.metrics.add(&self.metrics.tracks_pruned, stats.pruned);

        let triggered = self.evaluator.evaluate(&self.tracker, &self.zones);

        let mut triggers: BTreeMap<u64, TriggerState> = BTreeMap::new();
        for (track_id, rules) in &triggered {
            // Triggering implies the track is confirmed and present
            let Some(track) = self.tracker.get(*track_id) else {
                continue;
            };
            triggers.insert(
                *track_id,
                TriggerState {
                    rules: rules.clone(),
                    reason: self.evaluator.incident_reason(track, rules, &self.zones),
                    class_label: track.class_label.clone(),
                    confidence: track.max_confidence,
                    zone_presence: track.zone_presence.clone(),
                },
            );
        }

        let frame_incidents = self.incidents.update(&triggers, timestamp);
        self.metrics.add(
            &self.metrics.incidents_opened,
            frame_incidents.opened.len() as u64,
        );
        self.metrics.add(
            &self.metrics.incidents_closed,
            frame_incidents.closed.len() as u64,
        );

        // Gate scoring runs on the validated detections, each paired with
        // the zones its own centroid hits, independently of track state.
        // Malformed detections are invisible to the gate, same as to the
        // tracker.
        let gate_inputs: Vec<GateInput> = detections
            .iter()
            .filter(|d| d.is_valid())
            .map(|d| GateInput {
                detection: d,
                zones: self.zones.zones_at(d.centroid()),
            })
            .collect();
        let gate = self.gatekeeper.score(&gate_inputs);
        if gate.eligible {
            self.metrics.inc(&self.metrics.gate_eligible);
        } else {
            self.metrics.inc(&self.metrics.gate_rejected);
        }

        debug!(
            timestamp,
            confirmed = self.tracker.confirmed_count(),
            triggering = triggered.len(),
            opened = frame_incidents.opened.len(),
            closed = frame_incidents.closed.len(),
            "frame processed"
        );

        FrameOutput {
            tracks: self.tracker.confirmed().into_iter().cloned().collect(),
            triggered,
            opened: frame_incidents.opened,
            updated: frame_incidents.updated,
            closed: frame_incidents.closed,
            gate,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{crowd_rule_name, loitering_rule_name, RULE_RESTRICTED_ZONE_ENTRY};
    use crate::types::{BBox, Zone, ZoneKind};

    fn det(track_id: u64, class: &str, cx: f32, cy: f32) -> Detection {
        Detection {
            track_id,
            class_label: class.to_string(),
            confidence: 0.9,
            bbox: BBox {
                x: cx - 5.0,
                y: cy - 5.0,
                w: 10.0,
                h: 10.0,
            },
        }
    }

    fn config_with_restricted_zone() -> Config {
        Config {
            zones: vec![Zone {
                id: "vault".to_string(),
                name: "Vault".to_string(),
                kind: ZoneKind::Restricted,
                polygon: vec![[0.0, 0.0], [200.0, 0.0], [200.0, 200.0], [0.0, 200.0]],
            }],
            ..Config::default()
        }
    }

    #[test]
    fn scenario_three_persons_in_restricted_zone() {
        // Three person tracks enter a restricted zone and remain for 35s.
        // Expect: incidents open with restricted_zone_entry once each track
        // confirms, the crowd rule attaches to all three, and loitering is
        // added after 30s of dwell.
        let config = config_with_restricted_zone();
        let mut pipeline = FramePipeline::new(&config).unwrap();

        let dets = vec![
            det(1, "person", 40.0, 40.0),
            det(2, "person", 80.0, 80.0),
            det(3, "person", 120.0, 120.0),
        ];

        let mut total_opened = 0;
        let mut last = None;
        for i in 0..36 {
            let out = pipeline.process_frame(&dets, i as f64);
            total_opened += out.opened.len();
            last = Some(out);
        }
        let out = last.unwrap();

        assert_eq!(total_opened, 3, "exactly one incident per track");
        assert_eq!(out.tracks.len(), 3);

        for id in [1, 2, 3] {
            let rules = &out.triggered[&id];
            assert_eq!(
                rules,
                &vec![
                    RULE_RESTRICTED_ZONE_ENTRY.to_string(),
                    loitering_rule_name("vault"),
                    crowd_rule_name("vault"),
                ]
            );
        }

        // Incident snapshots carry the refreshed rule list and dwell
        let incident = out
            .updated
            .iter()
            .find(|i| i.track_id == 1)
            .expect("open incident for track 1");
        assert!(incident
            .triggered_rules
            .contains(&loitering_rule_name("vault")));
        assert!(incident.zone_presence["vault"] >= 30.0);
        assert!(incident.reason.contains("restricted zone 'vault'"));
    }

    #[test]
    fn incidents_close_when_tracks_leave() {
        let config = config_with_restricted_zone();
        let mut pipeline = FramePipeline::new(&config).unwrap();

        let inside = vec![det(1, "person", 50.0, 50.0)];
        for i in 0..5 {
            pipeline.process_frame(&inside, i as f64);
        }
        assert_eq!(pipeline.tracker().confirmed_count(), 1);

        // Step outside the zone: rules stop firing, incident closes
        let outside = vec![det(1, "person", 500.0, 500.0)];
        let out = pipeline.process_frame(&outside, 5.0);
        assert_eq!(out.closed.len(), 1);
        assert_eq!(out.closed[0].track_id, 1);
        assert!(out.triggered.is_empty());
    }

    #[test]
    fn incident_closes_when_track_ages_out() {
        let mut config = config_with_restricted_zone();
        config.tracker.max_age = 3;
        let mut pipeline = FramePipeline::new(&config).unwrap();

        let inside = vec![det(1, "person", 50.0, 50.0)];
        for i in 0..5 {
            pipeline.process_frame(&inside, i as f64);
        }

        // Track vanishes from the stream; rules stop immediately (the
        // track is still registered but its zone state stops triggering
        // only once the registry drops it — absence from the triggered
        // map is what closes the incident)
        let mut closed = 0;
        for i in 5..12 {
            let out = pipeline.process_frame(&[], i as f64);
            closed += out.closed.len();
        }
        assert_eq!(closed, 1);
        assert!(pipeline.tracker().is_empty());
    }

    #[test]
    fn pending_tracks_are_invisible() {
        let config = config_with_restricted_zone();
        let mut pipeline = FramePipeline::new(&config).unwrap();

        let dets = vec![det(1, "person", 50.0, 50.0)];
        let out = pipeline.process_frame(&dets, 0.0);
        assert!(out.tracks.is_empty());
        assert!(out.triggered.is_empty());
        assert!(out.opened.is_empty());

        pipeline.process_frame(&dets, 1.0);
        let out = pipeline.process_frame(&dets, 2.0);
        assert_eq!(out.tracks.len(), 1, "visible exactly at min_hits");
        assert_eq!(out.opened.len(), 1);
    }

    #[test]
    fn gate_scored_independently_of_tracks() {
        let config = config_with_restricted_zone();
        let mut pipeline = FramePipeline::new(&config).unwrap();

        // First frame: no confirmed tracks yet, but the gate already sees
        // the raw detection and its restricted-zone hit
        let out = pipeline.process_frame(&[det(1, "person", 50.0, 50.0)], 0.0);
        assert!(out.tracks.is_empty());
        assert!(out.gate.eligible);
        assert_eq!(out.gate.rule_conf, 1.0);
    }

    #[test]
    fn malformed_detections_never_reach_the_gate() {
        let config = config_with_restricted_zone();
        let mut pipeline = FramePipeline::new(&config).unwrap();

        // NaN confidence fails every threshold comparison, so an unfiltered
        // gate would wave the frame through with a NaN score
        let mut nan_det = det(1, "person", 50.0, 50.0);
        nan_det.confidence = f32::NAN;
        let out = pipeline.process_frame(&[nan_det.clone()], 0.0);
        assert!(!out.gate.eligible);
        assert_eq!(out.gate.vision_conf, 0.0);
        assert_eq!(out.gate.reason, "no detections");

        // A valid detection alongside it is scored alone
        let out = pipeline.process_frame(&[det(2, "person", 50.0, 50.0), nan_det], 1.0);
        assert!(out.gate.eligible);
        assert_eq!(out.gate.vision_conf, 0.9);

        // Out-of-range confidence is equally invisible
        let mut over = det(3, "person", 50.0, 50.0);
        over.confidence = 2.0;
        let out = pipeline.process_frame(&[over], 2.0);
        assert!(!out.gate.eligible);
        assert_eq!(out.gate.reason, "no detections");
    }

    #[test]
    fn privacy_flag_requires_the_person_in_the_public_zone() {
        let mut config = config_with_restricted_zone();
        config.zones = vec![Zone {
            id: "plaza".to_string(),
            name: "Plaza".to_string(),
            kind: ZoneKind::Public,
            polygon: vec![[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]],
        }];
        let mut pipeline = FramePipeline::new(&config).unwrap();

        // Car inside the plaza, person well outside it: no privacy risk
        let out = pipeline.process_frame(
            &[det(1, "car", 50.0, 50.0), det(2, "person", 500.0, 500.0)],
            0.0,
        );
        assert!(!out.gate.privacy_risk);

        // Move the person into the plaza: now the flag applies
        let out = pipeline.process_frame(
            &[det(1, "car", 50.0, 50.0), det(2, "person", 50.0, 60.0)],
            1.0,
        );
        assert!(out.gate.privacy_risk);
    }

    #[test]
    fn metrics_track_frame_activity() {
        let config = config_with_restricted_zone();
        let mut pipeline = FramePipeline::new(&config).unwrap();

        let mut bad = det(9, "person", 50.0, 50.0);
        bad.confidence = 2.0;
        pipeline.process_frame(&[det(1, "person", 50.0, 50.0), bad], 0.0);
        pipeline.process_frame(&[det(1, "person", 50.0, 50.0)], 1.0);
        pipeline.process_frame(&[det(1, "person", 50.0, 50.0)], 2.0);

        let summary = pipeline.metrics.summary();
        assert_eq!(summary.total_frames, 3);
        assert_eq!(summary.detections_rejected, 1);
        assert_eq!(summary.tracks_created, 1);
        assert_eq!(summary.tracks_confirmed, 1);
        assert_eq!(summary.incidents_opened, 1);
    }

    #[test]
    fn closed_incident_is_a_snapshot() {
        let config = config_with_restricted_zone();
        let mut pipeline = FramePipeline::new(&config).unwrap();

        let inside = vec![det(1, "person", 50.0, 50.0)];
        for i in 0..5 {
            pipeline.process_frame(&inside, i as f64);
        }
        let mut out = pipeline.process_frame(&[det(1, "person", 500.0, 500.0)], 5.0);

        // Mutating the returned copy must not affect later frames
        out.closed[0].reason.clear();
        let out2 = pipeline.process_frame(&inside, 6.0);
        assert!(out2.closed.is_empty());
    }
}
