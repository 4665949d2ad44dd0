// src/gatekeeper.rs
//
// Eligibility gate for downstream consumers (training export, alerting).
// Combines per-frame detection confidence with rule relevance and emits a
// yes/no decision plus a textual justification. Thresholds are checked in
// a fixed order (vision, rule, combined) and the first failure names the
// rejection reason.
//
// Inputs are validated detections, each paired with the zones its own
// centroid falls in, so zone-conditioned judgements (restricted bonus,
// privacy flag) apply to the detection that is actually in the zone.

use serde::{Deserialize, Serialize};

use crate::types::{Detection, GateScore, Zone, ZoneKind};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub min_vision_conf: f32,
    pub min_rule_conf: f32,
    pub min_combined_conf: f32,
    /// Classes that carry security relevance for rule confidence
    pub security_classes: Vec<String>,
    pub privacy: PrivacyConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_vision_conf: 0.5,
            min_rule_conf: 0.6,
            min_combined_conf: 0.55,
            security_classes: vec![
                "person".to_string(),
                "car".to_string(),
                "truck".to_string(),
                "backpack".to_string(),
                "suitcase".to_string(),
            ],
            privacy: PrivacyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Flag unconsented person detections inside public-type zones
    pub flag_public_persons: bool,
    /// Stricter variant: reject instead of flag
    pub require_consent: bool,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            flag_public_persons: true,
            require_consent: false,
        }
    }
}

const VISION_WEIGHT: f32 = 0.6;
const RULE_WEIGHT: f32 = 0.4;
const SECURITY_CLASS_RULE_CONF: f32 = 0.8;
const DEFAULT_RULE_CONF: f32 = 0.3;
const RESTRICTED_ZONE_BONUS: f32 = 0.2;

// ============================================================================
// SCORER
// ============================================================================

/// One validated detection plus the zones its centroid falls in.
#[derive(Debug, Clone)]
pub struct GateInput<'a> {
    pub detection: &'a Detection,
    pub zones: Vec<&'a Zone>,
}

pub struct GatekeeperScorer {
    pub config: GateConfig,
}

impl GatekeeperScorer {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, inputs: &[GateInput]) -> GateScore {
        if inputs.is_empty() {
            return GateScore {
                vision_conf: 0.0,
                rule_conf: 0.0,
                combined_conf: 0.0,
                eligible: false,
                privacy_risk: false,
                reason: "no detections".to_string(),
            };
        }

        let vision_conf = inputs.iter().map(|i| i.detection.confidence).sum::<f32>()
            / inputs.len() as f32;

        let security_relevant = inputs
            .iter()
            .any(|i| self.config.security_classes.contains(&i.detection.class_label));
        let mut rule_conf = if security_relevant {
            SECURITY_CLASS_RULE_CONF
        } else {
            DEFAULT_RULE_CONF
        };
        let in_restricted = inputs
            .iter()
            .any(|i| i.zones.iter().any(|z| z.kind == ZoneKind::Restricted));
        if in_restricted {
            rule_conf = (rule_conf + RESTRICTED_ZONE_BONUS).min(1.0);
        }

        let combined_conf = VISION_WEIGHT * vision_conf + RULE_WEIGHT * rule_conf;

        // First failing threshold determines the rejection reason
        if vision_conf < self.config.min_vision_conf {
            return GateScore {
                vision_conf,
                rule_conf,
                combined_conf,
                eligible: false,
                privacy_risk: false,
                reason: format!(
                    "vision confidence {:.3} below minimum {:.2}",
                    vision_conf, self.config.min_vision_conf
                ),
            };
        }
        if rule_conf < self.config.min_rule_conf {
            return GateScore {
                vision_conf,
                rule_conf,
                combined_conf,
                eligible: false,
                privacy_risk: false,
                reason: format!(
                    "rule confidence {:.3} below minimum {:.2}",
                    rule_conf, self.config.min_rule_conf
                ),
            };
        }
        if combined_conf < self.config.min_combined_conf {
            return GateScore {
                vision_conf,
                rule_conf,
                combined_conf,
                eligible: false,
                privacy_risk: false,
                reason: format!(
                    "combined confidence {:.3} below minimum {:.2}",
                    combined_conf, self.config.min_combined_conf
                ),
            };
        }

        // Privacy policy, applied only to otherwise-eligible results. The
        // flagged person must itself stand in the public zone; another
        // detection's zone hit does not implicate it.
        let unconsented_public_person = self.config.privacy.flag_public_persons
            && inputs.iter().any(|i| {
                i.detection.class_label == "person"
                    && i.zones.iter().any(|z| z.kind == ZoneKind::Public)
            });

        if unconsented_public_person && self.config.privacy.require_consent {
            return GateScore {
                vision_conf,
                rule_conf,
                combined_conf,
                eligible: false,
                privacy_risk: true,
                reason: "unconsented person in public zone (consent required)".to_string(),
            };
        }

        GateScore {
            vision_conf,
            rule_conf,
            combined_conf,
            eligible: true,
            privacy_risk: unconsented_public_person,
            reason: if unconsented_public_person {
                "eligible; privacy risk: unconsented person in public zone".to_string()
            } else {
                "eligible".to_string()
            },
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
