// src/rules.rs
//
// Time-based rule evaluation over confirmed track state. Every rule is a
// pure predicate; evaluate() never mutates anything, so calling it twice
// on the same snapshot yields identical results in identical order.
//
// Rule order is fixed and documented:
//   1. restricted_zone_entry
//   2. loitering_in_<zone>          (per occupied zone, sorted by zone id)
//   3. object_left_unattended
//   4. rapid_movement
//   5. multiple_tracks_in_<zone>    (registry-wide, sorted by zone id)
//
// No rule short-circuits another; all applicable rules are collected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tracker::{TrackState, Tracker};
use crate::types::ZoneKind;
use crate::zones::ZoneIndex;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Dwell seconds in a zone before loitering fires (inclusive)
    pub loitering_threshold_secs: f64,
    /// Stationary seconds before a non-person object counts as unattended
    pub unattended_threshold_secs: f64,
    /// Mean speed above this fires rapid_movement
    pub speed_threshold_px_per_sec: f32,
    /// Displacement samples the rapid_movement window requires
    pub rapid_window: usize,
    /// Frame rate assumed when scaling per-frame displacement to speed
    pub assumed_fps: f32,
    /// Confirmed same-class tracks in one zone before the crowd rule fires
    pub crowd_threshold: usize,
    /// Class the crowd rule counts
    pub crowd_class: String,
    /// Classes exempt from object_left_unattended
    pub person_classes: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            loitering_threshold_secs: 30.0,
            unattended_threshold_secs: 60.0,
            speed_threshold_px_per_sec: 100.0,
            rapid_window: 10,
            assumed_fps: 30.0,
            crowd_threshold: 3,
            crowd_class: "person".to_string(),
            person_classes: vec!["person".to_string()],
        }
    }
}

pub const RULE_RESTRICTED_ZONE_ENTRY: &str = "restricted_zone_entry";
pub const RULE_OBJECT_LEFT_UNATTENDED: &str = "object_left_unattended";
pub const RULE_RAPID_MOVEMENT: &str = "rapid_movement";
const LOITERING_PREFIX: &str = "loitering_in_";
const CROWD_PREFIX: &str = "multiple_tracks_in_";

pub fn loitering_rule_name(zone_id: &str) -> String {
    format!("{LOITERING_PREFIX}{zone_id}")
}

pub fn crowd_rule_name(zone_id: &str) -> String {
    format!("{CROWD_PREFIX}{zone_id}")
}

// ============================================================================
// RULES
// ============================================================================

/// Per-track rules in their fixed evaluation order. Every variant is a
/// pure predicate with the same shape: given a track and the evaluation
/// context, emit zero or more rule names. Keeping them in one ordered
/// list makes the output order reproducible by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PerTrackRule {
    RestrictedZoneEntry,
    Loitering,
    ObjectLeftUnattended,
    RapidMovement,
}

const PER_TRACK_RULES: [PerTrackRule; 4] = [
    PerTrackRule::RestrictedZoneEntry,
    PerTrackRule::Loitering,
    PerTrackRule::ObjectLeftUnattended,
    PerTrackRule::RapidMovement,
];

impl PerTrackRule {
    fn apply(self, track: &TrackState, config: &RulesConfig, zones: &ZoneIndex) -> Vec<String> {
        match self {
            Self::RestrictedZoneEntry => {
                let entered = track
                    .current_zones
                    .iter()
                    .any(|id| zones.kind_of(id) == Some(ZoneKind::Restricted));
                if entered {
                    vec![RULE_RESTRICTED_ZONE_ENTRY.to_string()]
                } else {
                    Vec::new()
                }
            }
            Self::Loitering => {
                // current_zones is ordered, so zone-qualified names come
                // out in a fixed order
                track
                    .current_zones
                    .iter()
                    .filter(|id| track.dwell_seconds(id) >= config.loitering_threshold_secs)
                    .map(|id| loitering_rule_name(id))
                    .collect()
            }
            Self::ObjectLeftUnattended => {
                if config.person_classes.contains(&track.class_label) || !track.is_stationary {
                    return Vec::new();
                }
                let unattended = track
                    .stationary_seconds()
                    .map(|secs| secs >= config.unattended_threshold_secs)
                    .unwrap_or(false);
                if unattended {
                    vec![RULE_OBJECT_LEFT_UNATTENDED.to_string()]
                } else {
                    Vec::new()
                }
            }
            Self::RapidMovement => {
                let rapid = track
                    .recent_mean_displacement(config.rapid_window)
                    .map(|mean| mean * config.assumed_fps > config.speed_threshold_px_per_sec)
                    .unwrap_or(false);
                if rapid {
                    vec![RULE_RAPID_MOVEMENT.to_string()]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

// ============================================================================
// EVALUATOR
// ============================================================================

pub struct RuleEvaluator {
    pub config: RulesConfig,
}

impl RuleEvaluator {
    pub fn new(config: RulesConfig) -> Self {
        Self { config }
    }

    /// Evaluate every rule against every confirmed track. Only tracks with
    /// at least one triggered rule appear in the result. No rule
    /// short-circuits another; all applicable names are collected.
    pub fn evaluate(&self, tracker: &Tracker, zones: &ZoneIndex) -> BTreeMap<u64, Vec<String>> {
        let confirmed = tracker.confirmed();
        let mut triggered: BTreeMap<u64, Vec<String>> = BTreeMap::new();

        for track in &confirmed {
            let mut rules = Vec::new();
            for rule in PER_TRACK_RULES {
                rules.extend(rule.apply(track, &self.config, zones));
            }
            if !rules.is_empty() {
                triggered.insert(track.track_id, rules);
            }
        }

        // Registry-wide crowd rule: when a zone holds crowd_threshold or
        // more matching tracks, the rule attaches to every qualifying track
        let mut zone_members: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
        for track in &confirmed {
            if track.class_label != self.config.crowd_class {
                continue;
            }
            for zone_id in &track.current_zones {
                zone_members
                    .entry(zone_id.as_str())
                    .or_default()
                    .push(track.track_id);
            }
        }
        for (zone_id, members) in &zone_members {
            if members.len() >= self.config.crowd_threshold {
                let name = crowd_rule_name(zone_id);
                for track_id in members {
                    triggered.entry(*track_id).or_default().push(name.clone());
                }
            }
        }

        triggered
    }

    /// Deterministic human-readable summary: one clause per triggered rule,
    /// joined with "; ".
    pub fn incident_reason(
        &self,
        track: &TrackState,
        rules: &[String],
        zones: &ZoneIndex,
    ) -> String {
        let clauses: Vec<String> = rules
            .iter()
            .map(|rule| self.reason_clause(track, rule, zones))
            .collect();
        clauses.join("; ")
    }

    fn reason_clause(&self, track: &TrackState, rule: &str, zones: &ZoneIndex) -> String {
        if rule == RULE_RESTRICTED_ZONE_ENTRY {
            let zone = track
                .current_zones
                .iter()
                .find(|id| zones.kind_of(id) == Some(ZoneKind::Restricted))
                .map(|s| s.as_str())
                .unwrap_or("unknown");
            format!("{} entered restricted zone '{}'", track.class_label, zone)
        } else if let Some(zone) = rule.strip_prefix(LOITERING_PREFIX) {
            format!(
                "loitering in zone '{}' for {:.1}s",
                zone,
                track.dwell_seconds(zone)
            )
        } else if rule == RULE_OBJECT_LEFT_UNATTENDED {
            format!(
                "{} left unattended for {:.1}s",
                track.class_label,
                track.stationary_seconds().unwrap_or(0.0)
            )
        } else if rule == RULE_RAPID_MOVEMENT {
            let speed = track
                .recent_mean_displacement(self.config.rapid_window)
                .map(|mean| mean * self.config.assumed_fps)
                .unwrap_or(0.0);
            format!("rapid movement at {:.0} px/s", speed)
        } else if let Some(zone) = rule.strip_prefix(CROWD_PREFIX) {
            format!(
                "{} or more '{}' tracks in zone '{}'",
                self.config.crowd_threshold, self.config.crowd_class, zone
            )
        } else {
            rule.to_string()
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
