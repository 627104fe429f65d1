use footfall_geom::{bbox_polygon_overlap_ratio, point_in_polygon, BoundingBox};
use footfall_proto::analytics::{ZoneKind, ZoneState};

use crate::config::Zone;
use crate::doctor;
use crate::error::InputError;

/// Stateless per-frame zone classifier.
#[derive(Debug, Clone)]
pub struct ZoneEvaluator {
    zones: Vec<Zone>,
}

impl ZoneEvaluator {
    pub fn new(zones: Vec<Zone>) -> Result<Self, InputError> {
        doctor::check_geometry(&zones, &[])?;
        Ok(Self { zones })
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// One state per configured zone, in configuration order.
    pub fn evaluate(&self, boxes: &[BoundingBox]) -> Vec<ZoneState> {
        self.zones.iter().map(|z| evaluate_zone(z, boxes)).collect()
    }
}

pub fn evaluate_zone(zone: &Zone, boxes: &[BoundingBox]) -> ZoneState {
    match zone.kind {
        ZoneKind::Presence => {
            ZoneState::Active(boxes.iter().any(|b| point_in_polygon(b.centroid(), &zone.points)))
        }
        ZoneKind::Occupancy => {
            let n = boxes
                .iter()
                .filter(|b| bbox_polygon_overlap_ratio(b, &zone.points) >= zone.overlap_threshold)
                .count();
            ZoneState::Count(n as u32)
        }
    }
}
