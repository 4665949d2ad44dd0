// src/zones.rs
//
// Static zone geometry. Built once from configuration, read-only for the
// lifetime of a run, safe to share across camera streams.

use std::collections::BTreeSet;

use anyhow::{ensure, Result};

use crate::types::{Zone, ZoneKind};

pub struct ZoneIndex {
    zones: Vec<Zone>,
}

impl ZoneIndex {
    pub fn new(zones: Vec<Zone>) -> Result<Self> {
        for zone in &zones {
            ensure!(
                zone.polygon.len() >= 3,
                "zone '{}' polygon has fewer than 3 vertices",
                zone.id
            );
        }
        Ok(Self { zones })
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn get(&self, id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn kind_of(&self, id: &str) -> Option<ZoneKind> {
        self.get(id).map(|z| z.kind)
    }

    /// Ids of all zones whose polygon contains `point`. Ordered so that
    /// downstream rule lists and reasons are deterministic.
    pub fn zones_containing(&self, point: (f32, f32)) -> BTreeSet<String> {
        self.zones
            .iter()
            .filter(|z| polygon_contains(&z.polygon, point))
            .map(|z| z.id.clone())
            .collect()
    }

    /// Zones whose polygon contains `point`, in registration order.
    pub fn zones_at(&self, point: (f32, f32)) -> Vec<&Zone> {
        self.zones
            .iter()
            .filter(|z| polygon_contains(&z.polygon, point))
            .collect()
    }
}

const EDGE_EPSILON: f32 = 1e-4;

/// Ray-cast point-in-polygon test. A point lying on a polygon edge (or
/// vertex) counts as inside.
pub fn polygon_contains(polygon: &[[f32; 2]], point: (f32, f32)) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if point_on_segment(a, b, point) {
            return true;
        }
    }

    let (px, py) = point;
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (polygon[i][0], polygon[i][1]);
        let (xj, yj) = (polygon[j][0], polygon[j][1]);
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn point_on_segment(a: [f32; 2], b: [f32; 2], p: (f32, f32)) -> bool {
    let (px, py) = p;
    let cross = (b[0] - a[0]) * (py - a[1]) - (b[1] - a[1]) * (px - a[0]);
    if cross.abs() > EDGE_EPSILON * ((b[0] - a[0]).abs() + (b[1] - a[1]).abs()).max(1.0) {
        return false;
    }
    let within_x = px >= a[0].min(b[0]) - EDGE_EPSILON && px <= a[0].max(b[0]) + EDGE_EPSILON;
    let within_y = py >= a[1].min(b[1]) - EDGE_EPSILON && py <= a[1].max(b[1]) + EDGE_EPSILON;
    within_x && within_y
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(id: &str, kind: ZoneKind) -> Zone {
        Zone {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            polygon: vec![[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]],
        }
    }

    #[test]
    fn point_inside_square() {
        assert!(polygon_contains(
            &square("a", ZoneKind::Public).polygon,
            (50.0, 50.0)
        ));
    }

    #[test]
    fn point_outside_square() {
        assert!(!polygon_contains(
            &square("a", ZoneKind::Public).polygon,
            (150.0, 50.0)
        ));
    }

    #[test]
    fn boundary_point_counts_as_inside() {
        let poly = square("a", ZoneKind::Public).polygon;
        assert!(polygon_contains(&poly, (100.0, 50.0)));
        assert!(polygon_contains(&poly, (0.0, 0.0)));
    }

    #[test]
    fn concave_polygon() {
        // L-shape; the notch at the upper right is outside
        let poly = vec![
            [0.0, 0.0],
            [100.0, 0.0],
            [100.0, 50.0],
            [50.0, 50.0],
            [50.0, 100.0],
            [0.0, 100.0],
        ];
        assert!(polygon_contains(&poly, (25.0, 75.0)));
        assert!(!polygon_contains(&poly, (75.0, 75.0)));
    }

    #[test]
    fn index_rejects_degenerate_polygon() {
        let mut zone = square("a", ZoneKind::Restricted);
        zone.polygon.truncate(2);
        assert!(ZoneIndex::new(vec![zone]).is_err());
    }

    #[test]
    fn zones_containing_is_ordered() {
        let outer = square("outer", ZoneKind::Public);
        let mut inner = square("inner", ZoneKind::Restricted);
        inner.polygon = vec![[25.0, 25.0], [75.0, 25.0], [75.0, 75.0], [25.0, 75.0]];
        let index = ZoneIndex::new(vec![outer, inner]).unwrap();

        let hits = index.zones_containing((50.0, 50.0));
        let ids: Vec<&str> = hits.iter().map(|s| s.as_str()).collect();
        assert_eq!(ids, vec!["inner", "outer"]);
    }

    #[test]
    fn unknown_zone_kind_lookup_is_none() {
        let index = ZoneIndex::new(vec![square("a", ZoneKind::Monitored)]).unwrap();
        assert!(index.kind_of("missing").is_none());
    }
}
