// src/incidents.rs
//
// Incident lifecycle state machine, one instance per track:
//
//   no-incident → open → (update)* → closed
//
// Open and closed are terminal per instance; a track that stops
// triggering and later re-triggers gets a brand-new incident with a new
// monotonic id. Exactly one open incident exists per track at any time.
// Closing happens the first frame a track is absent from the triggered
// map, whether its rules stopped firing or the track aged out — the
// state machine cannot tell the difference and does not need to.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::types::{Incident, IncidentStatus};

/// Everything the incident manager needs to know about one triggering
/// track this frame, snapshotted by the pipeline from live track state.
#[derive(Debug, Clone)]
pub struct TriggerState {
    pub rules: Vec<String>,
    pub reason: String,
    pub class_label: String,
    pub confidence: f32,
    pub zone_presence: BTreeMap<String, f64>,
}

/// Receives every closed incident, e.g. a store writer or a training-data
/// converter. Called synchronously on close with a finished value.
pub trait IncidentSink {
    fn incident_closed(&mut self, incident: &Incident);
}

/// Default sink: drop the incident; callers read it from FrameIncidents.
#[derive(Debug, Default)]
pub struct NullSink;

impl IncidentSink for NullSink {
    fn incident_closed(&mut self, _incident: &Incident) {}
}

/// Per-frame incident deltas. Snapshot copies — mutating them cannot
/// touch manager state.
#[derive(Debug, Clone, Default)]
pub struct FrameIncidents {
    pub opened: Vec<Incident>,
    pub updated: Vec<Incident>,
    pub closed: Vec<Incident>,
}

pub struct IncidentManager {
    open: BTreeMap<u64, Incident>,
    next_id: u64,
    sink: Box<dyn IncidentSink + Send>,
}

impl Default for IncidentManager {
    fn default() -> Self {
        Self::new()
    }
}

impl IncidentManager {
    pub fn new() -> Self {
        Self {
            open: BTreeMap::new(),
            next_id: 1,
            sink: Box::new(NullSink),
        }
    }

    pub fn set_sink(&mut self, sink: Box<dyn IncidentSink + Send>) {
        self.sink = sink;
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn open_incident(&self, track_id: u64) -> Option<&Incident> {
        self.open.get(&track_id)
    }

    /// Drive the state machine one frame forward from the rule evaluator's
    /// output. Absence from `triggers` closes; presence opens or updates.
    pub fn update(&mut self, triggers: &BTreeMap<u64, TriggerState>, now: f64) -> FrameIncidents {
        let mut result = FrameIncidents::default();

        // Close first: every open incident whose track is absent this frame.
        // end_time is now; duration stays the span of the triggering
        // interval (last_time - start_time).
        let closing: Vec<u64> = self
            .open
            .keys()
            .filter(|id| !triggers.contains_key(id))
            .copied()
            .collect();
        for track_id in closing {
            if let Some(mut incident) = self.open.remove(&track_id) {
                incident.end_time = Some(now);
                incident.status = IncidentStatus::Closed;
                info!(
                    incident_id = incident.incident_id,
                    track_id,
                    duration_secs = incident.duration_seconds,
                    "incident closed"
                );
                self.sink.incident_closed(&incident);
                result.closed.push(incident);
            }
        }

        for (track_id, trigger) in triggers {
            match self.open.get_mut(track_id) {
                Some(incident) => {
                    incident.last_time = now;
                    incident.duration_seconds = now - incident.start_time;
                    incident.triggered_rules = trigger.rules.clone();
                    incident.reason = trigger.reason.clone();
                    if trigger.confidence > incident.max_confidence {
                        incident.max_confidence = trigger.confidence;
                    }
                    incident.zone_presence = trigger.zone_presence.clone();
                    debug!(
                        incident_id = incident.incident_id,
                        track_id = *track_id,
                        "incident updated"
                    );
                    result.updated.push(incident.clone());
                }
                None => {
                    let incident = Incident {
                        incident_id: self.next_id,
                        track_id: *track_id,
                        class_label: trigger.class_label.clone(),
                        triggered_rules: trigger.rules.clone(),
                        reason: trigger.reason.clone(),
                        start_time: now,
                        last_time: now,
                        end_time: None,
                        duration_seconds: 0.0,
                        max_confidence: trigger.confidence,
                        zone_presence: trigger.zone_presence.clone(),
                        status: IncidentStatus::Open,
                    };
                    self.next_id += 1;
                    info!(
                        incident_id = incident.incident_id,
                        track_id = *track_id,
                        reason = %incident.reason,
                        "incident opened"
                    );
                    result.opened.push(incident.clone());
                    self.open.insert(*track_id, incident);
                }
            }
        }

        result
    }
}

// ============================================================================
// TESTS
// ============================================================================
