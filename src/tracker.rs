// src/tracker.rs
//
// Per-identity track state and the registry that owns it.
//
// Design:
//   - Identity association happens upstream; each detection arrives with a
//     stable track_id, so there is no matching phase here
//   - A track is Pending on first sight and promoted to Confirmed after
//     min_hits detections; only confirmed tracks are visible to rules
//   - Zone dwell accumulates the wall-clock delta between the previous
//     last_seen and the current frame time, for every zone the track
//     occupies this frame (the delta is read BEFORE last_seen is
//     overwritten — reading it after would make dwell permanently zero)
//   - Age-out is a frame-count sweep after all detections are processed,
//     never a wall-clock timeout, so replays stay deterministic

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::Detection;
use crate::zones::ZoneIndex;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Detections required to promote Pending → Confirmed
    pub min_hits: u64,
    /// Frames a track survives without a detection before removal
    pub max_age: u64,
    /// Mean ring-buffer displacement below this (pixels) counts as stationary
    pub stationary_epsilon_px: f32,
    /// Displacement samples required before the stationary flag can set
    pub stationary_min_samples: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_hits: 3,
            max_age: 30,
            stationary_epsilon_px: 5.0,
            stationary_min_samples: 10,
        }
    }
}

/// Capacity of the frame-to-frame displacement ring buffer
const DISPLACEMENT_CAPACITY: usize = 30;
/// Centroid history cap; diagnostics only, never consulted by rule logic
const CENTROID_HISTORY_CAP: usize = 100;

// ============================================================================
// TRACK STATE
// ============================================================================

/// Memory for one physical object's identity over time.
#[derive(Debug, Clone)]
pub struct TrackState {
    pub track_id: u64,
    /// Fixed at creation; later detections do not re-label the track
    pub class_label: String,

    pub first_seen: f64,
    pub last_seen: f64,
    pub frame_count: u64,

    pub current_bbox: crate::types::BBox,
    pub current_centroid: (f32, f32),
    pub centroid_history: VecDeque<(f32, f32)>,

    pub max_confidence: f32,
    pub avg_confidence: f32,
    confidence_sum: f64,

    /// Recent frame-to-frame centroid displacements, capacity 30
    displacements: VecDeque<f32>,
    pub is_stationary: bool,
    /// Set exactly once per false→true stationary edge, cleared on true→false
    pub stationary_since: Option<f64>,

    /// Zones occupied this frame; valid for the current frame only
    pub current_zones: BTreeSet<String>,
    /// Accumulated dwell seconds per zone
    pub zone_presence: BTreeMap<String, f64>,
    /// Timestamp of first entry; reset only on re-entry after a full absence
    pub zone_entry_time: BTreeMap<String, f64>,

    pub confirmed: bool,
    /// Frame index of the tracker update that last saw this identity
    last_seen_frame: u64,
}

impl TrackState {
    fn new(det: &Detection, zones_now: BTreeSet<String>, now: f64, frame_index: u64) -> Self {
        let centroid = det.centroid();
        let mut centroid_history = VecDeque::with_capacity(CENTROID_HISTORY_CAP);
        centroid_history.push_back(centroid);

        let mut zone_entry_time = BTreeMap::new();
        for zone in &zones_now {
            zone_entry_time.insert(zone.clone(), now);
        }

        Self {
            track_id: det.track_id,
            class_label: det.class_label.clone(),
            first_seen: now,
            last_seen: now,
            frame_count: 1,
            current_bbox: det.bbox,
            current_centroid: centroid,
            centroid_history,
            max_confidence: det.confidence,
            avg_confidence: det.confidence,
            confidence_sum: det.confidence as f64,
            displacements: VecDeque::with_capacity(DISPLACEMENT_CAPACITY),
            is_stationary: false,
            stationary_since: None,
            current_zones: zones_now,
            zone_presence: BTreeMap::new(),
            zone_entry_time,
            confirmed: false,
            last_seen_frame: frame_index,
        }
    }

    fn update(
        &mut self,
        det: &Detection,
        zones_now: BTreeSet<String>,
        now: f64,
        frame_index: u64,
        config: &TrackerConfig,
    ) {
        // Dwell delta from the PRE-update last_seen; computed before the
        // field is overwritten below
        let elapsed = (now - self.last_seen).max(0.0);
        for zone in &zones_now {
            *self.zone_presence.entry(zone.clone()).or_insert(0.0) += elapsed;
            if !self.current_zones.contains(zone) {
                // Re-entry after a full absence restarts the entry clock
                self.zone_entry_time.insert(zone.clone(), now);
            }
        }
        self.current_zones = zones_now;

        let centroid = det.centroid();
        let (px, py) = self.current_centroid;
        let displacement = ((centroid.0 - px).powi(2) + (centroid.1 - py).powi(2)).sqrt();
        if self.displacements.len() == DISPLACEMENT_CAPACITY {
            self.displacements.pop_front();
        }
        self.displacements.push_back(displacement);

        self.current_bbox = det.bbox;
        self.current_centroid = centroid;
        if self.centroid_history.len() == CENTROID_HISTORY_CAP {
            self.centroid_history.pop_front();
        }
        self.centroid_history.push_back(centroid);

        self.frame_count += 1;
        self.confidence_sum += det.confidence as f64;
        self.avg_confidence = (self.confidence_sum / self.frame_count as f64) as f32;
        if det.confidence > self.max_confidence {
            self.max_confidence = det.confidence;
        }

        self.update_stationary(now, config);

        self.last_seen = now;
        self.last_seen_frame = frame_index;
    }

    fn update_stationary(&mut self, now: f64, config: &TrackerConfig) {
        let Some(mean) = self.mean_displacement() else {
            return;
        };
        let enough = self.displacements.len() >= config.stationary_min_samples;
        if enough && mean < config.stationary_epsilon_px {
            if !self.is_stationary {
                self.is_stationary = true;
                self.stationary_since = Some(now);
                debug!(
                    track_id = self.track_id,
                    mean_px = mean,
                    "track became stationary"
                );
            }
        } else if self.is_stationary && mean >= config.stationary_epsilon_px {
            self.is_stationary = false;
            self.stationary_since = None;
            debug!(track_id = self.track_id, mean_px = mean, "track moving again");
        }
    }

    /// Mean displacement over the whole ring buffer, if any samples exist.
    pub fn mean_displacement(&self) -> Option<f32> {
        if self.displacements.is_empty() {
            return None;
        }
        Some(self.displacements.iter().sum::<f32>() / self.displacements.len() as f32)
    }

    /// Mean displacement over the most recent `window` samples; `None`
    /// until the ring holds at least that many.
    pub fn recent_mean_displacement(&self, window: usize) -> Option<f32> {
        if self.displacements.len() < window || window == 0 {
            return None;
        }
        let sum: f32 = self.displacements.iter().rev().take(window).sum();
        Some(sum / window as f32)
    }

    pub fn displacement_samples(&self) -> usize {
        self.displacements.len()
    }

    /// Accumulated dwell seconds in a zone; unknown zone id reads as zero.
    pub fn dwell_seconds(&self, zone_id: &str) -> f64 {
        self.zone_presence.get(zone_id).copied().unwrap_or(0.0)
    }

    /// Seconds this track has been continuously stationary, as of last_seen.
    pub fn stationary_seconds(&self) -> Option<f64> {
        self.stationary_since.map(|since| self.last_seen - since)
    }
}

// ============================================================================
// TRACKER (REGISTRY)
// ============================================================================

/// Per-frame bookkeeping the pipeline feeds into metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateStats {
    pub rejected: u64,
    pub created: u64,
    pub confirmed: u64,
    pub pruned: u64,
}

/// Owns every pending and confirmed track for one camera stream.
pub struct Tracker {
    pub config: TrackerConfig,
    tracks: HashMap<u64, TrackState>,
    frame_index: u64,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: HashMap::new(),
            frame_index: 0,
        }
    }

    /// Process one frame of detections. Malformed entries are rejected
    /// without error; tracks unseen for more than max_age frames are swept
    /// after all detections are applied.
    pub fn update(
        &mut self,
        detections: &[Detection],
        zones: &ZoneIndex,
        timestamp: f64,
    ) -> UpdateStats {
        self.frame_index += 1;
        let frame_index = self.frame_index;
        let config = self.config.clone();
        let mut stats = UpdateStats::default();

        for det in detections {
            if !det.is_valid() {
                warn!(
                    track_id = det.track_id,
                    confidence = det.confidence,
                    "rejected malformed detection"
                );
                stats.rejected += 1;
                continue;
            }

            let zones_now = zones.zones_containing(det.centroid());

            match self.tracks.entry(det.track_id) {
                Entry::Occupied(mut entry) => {
                    let track = entry.get_mut();
                    let was_confirmed = track.confirmed;
                    track.update(det, zones_now, timestamp, frame_index, &config);
                    if !was_confirmed && track.frame_count >= config.min_hits {
                        track.confirmed = true;
                        stats.confirmed += 1;
                        info!(
                            track_id = track.track_id,
                            class = %track.class_label,
                            "track confirmed"
                        );
                    }
                }
                Entry::Vacant(entry) => {
                    let mut track = TrackState::new(det, zones_now, timestamp, frame_index);
                    if track.frame_count >= config.min_hits {
                        track.confirmed = true;
                        stats.confirmed += 1;
                    }
                    debug!(
                        track_id = track.track_id,
                        class = %track.class_label,
                        "track created"
                    );
                    entry.insert(track);
                    stats.created += 1;
                }
            }
        }

        // Age-out sweep: frame-count based, applied once per frame
        let max_age = config.max_age;
        let before = self.tracks.len();
        self.tracks.retain(|_, t| {
            let keep = frame_index - t.last_seen_frame <= max_age;
            if !keep {
                info!(
                    track_id = t.track_id,
                    unseen_frames = frame_index - t.last_seen_frame,
                    "track aged out"
                );
            }
            keep
        });
        stats.pruned = (before - self.tracks.len()) as u64;

        stats
    }

    /// Confirmed tracks in ascending track_id order. Pending tracks are
    /// invisible to rules and incidents.
    pub fn confirmed(&self) -> Vec<&TrackState> {
        let mut out: Vec<&TrackState> = self.tracks.values().filter(|t| t.confirmed).collect();
        out.sort_by_key(|t| t.track_id);
        out
    }

    pub fn confirmed_count(&self) -> usize {
        self.tracks.values().filter(|t| t.confirmed).count()
    }

    pub fn get(&self, track_id: u64) -> Option<&TrackState> {
        self.tracks.get(&track_id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
        self.frame_index = 0;
    }
}

// ============================================================================
// TESTS
// ============================================================================
