// src/config.rs
//
// Configuration loading and one-shot validation. Bad thresholds or
// degenerate zone polygons are fatal at load time — a silently ignored
// threshold would change safety-relevant behavior mid-run, so nothing
// here is tolerated per frame.

use anyhow::{ensure, Context, Result};
use std::fs;

use crate::types::Config;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for zone in &self.zones {
            ensure!(!zone.id.is_empty(), "zone with empty id");
            ensure!(
                zone.polygon.len() >= 3,
                "zone '{}' polygon has {} vertices, need at least 3",
                zone.id,
                zone.polygon.len()
            );
        }
        let dup = self
            .zones
            .iter()
            .enumerate()
            .find(|(i, z)| self.zones[..*i].iter().any(|other| other.id == z.id));
        ensure!(
            dup.is_none(),
            "duplicate zone id '{}'",
            dup.map(|(_, z)| z.id.as_str()).unwrap_or_default()
        );

        let t = &self.tracker;
        ensure!(t.min_hits >= 1, "tracker.min_hits must be at least 1");
        ensure!(t.max_age >= 1, "tracker.max_age must be at least 1");
        ensure!(
            t.stationary_epsilon_px > 0.0,
            "tracker.stationary_epsilon_px must be positive"
        );
        ensure!(
            t.stationary_min_samples >= 1,
            "tracker.stationary_min_samples must be at least 1"
        );

        let r = &self.rules;
        ensure!(
            r.loitering_threshold_secs > 0.0,
            "rules.loitering_threshold_secs must be positive"
        );
        ensure!(
            r.unattended_threshold_secs > 0.0,
            "rules.unattended_threshold_secs must be positive"
        );
        ensure!(
            r.speed_threshold_px_per_sec > 0.0,
            "rules.speed_threshold_px_per_sec must be positive"
        );
        ensure!(r.rapid_window >= 1, "rules.rapid_window must be at least 1");
        ensure!(r.assumed_fps > 0.0, "rules.assumed_fps must be positive");
        ensure!(
            r.crowd_threshold >= 1,
            "rules.crowd_threshold must be at least 1"
        );

        let g = &self.gate;
        for (name, v) in [
            ("min_vision_conf", g.min_vision_conf),
            ("min_rule_conf", g.min_rule_conf),
            ("min_combined_conf", g.min_combined_conf),
        ] {
            ensure!(
                (0.0..=1.0).contains(&v),
                "gate.{name} must be within [0, 1], got {v}"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::types::Config;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config = Config::from_yaml("rules:\n  loitering_threshold_secs: 12.5\n").unwrap();
        assert_eq!(config.rules.loitering_threshold_secs, 12.5);
        assert_eq!(config.tracker.min_hits, 3);
        assert_eq!(config.gate.min_vision_conf, 0.5);
    }

    #[test]
    fn degenerate_polygon_rejected() {
        let yaml = r#"
zones:
  - id: gate_a
    name: Gate A
    kind: restricted
    polygon: [[0.0, 0.0], [10.0, 0.0]]
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("gate_a"));
    }

    #[test]
    fn non_positive_threshold_rejected() {
        let err = Config::from_yaml("rules:\n  loitering_threshold_secs: 0.0\n").unwrap_err();
        assert!(err.to_string().contains("loitering_threshold_secs"));
    }

    #[test]
    fn duplicate_zone_id_rejected() {
        let yaml = r#"
zones:
  - id: lobby
    name: Lobby
    kind: public
    polygon: [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0]]
  - id: lobby
    name: Lobby again
    kind: public
    polygon: [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0]]
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn gate_threshold_out_of_range_rejected() {
        let err = Config::from_yaml("gate:\n  min_rule_conf: 1.5\n").unwrap_err();
        assert!(err.to_string().contains("min_rule_conf"));
    }
}
