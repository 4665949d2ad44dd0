// src/identity.rs
//
// Identity continuity is supplied upstream: the detector/associator hands
// us detections that already carry a stable track_id. The resolver is an
// injected seam so an alternate association strategy can be substituted
// without touching tracking, rule or incident logic.

use crate::types::Detection;

pub trait IdentityResolver {
    /// Map one frame of raw detector output to identity-stable detections.
    fn resolve(&mut self, detections: Vec<Detection>, timestamp: f64) -> Vec<Detection>;
}

/// Default resolver: trust the ids the upstream associator assigned.
#[derive(Debug, Default)]
pub struct UpstreamIdentity;

impl IdentityResolver for UpstreamIdentity {
    fn resolve(&mut self, detections: Vec<Detection>, _timestamp: f64) -> Vec<Detection> {
        detections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BBox;

    #[test]
    fn upstream_identity_is_passthrough() {
        let det = Detection {
            track_id: 7,
            class_label: "person".to_string(),
            confidence: 0.9,
            bbox: BBox {
                x: 0.0,
                y: 0.0,
                w: 10.0,
                h: 10.0,
            },
        };
        let mut resolver = UpstreamIdentity;
        let out = resolver.resolve(vec![det], 1.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].track_id, 7);
    }
}
