use footfall_geom::Point;
use footfall_proto::analytics::ZoneKind;
use serde::{Deserialize, Serialize};

pub const DEFAULT_OVERLAP_THRESHOLD: f32 = 0.20;

fn default_overlap_threshold() -> f32 {
    DEFAULT_OVERLAP_THRESHOLD
}

/// A named polygon over the normalized frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ZoneKind,
    pub points: Vec<Point>,
    /// Occupancy zones only.
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: f32,
    /// RGB used when drawing; a kind default applies otherwise.
    #[serde(default)]
    pub color: Option<[u8; 3]>,
}

impl Zone {
    pub fn presence(name: impl Into<String>, points: Vec<Point>) -> Self {
        Self { name: name.into(), kind: ZoneKind::Presence, points, overlap_threshold: DEFAULT_OVERLAP_THRESHOLD, color: None }
    }

    pub fn occupancy(name: impl Into<String>, points: Vec<Point>, overlap_threshold: f32) -> Self {
        Self { name: name.into(), kind: ZoneKind::Occupancy, points, overlap_threshold, color: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountingLine {
    pub name: String,
    pub start: Point,
    pub end: Point,
    #[serde(default)]
    pub color: Option<[u8; 3]>,
}

impl CountingLine {
    pub fn new(name: impl Into<String>, start: Point, end: Point) -> Self {
        Self { name: name.into(), start, end, color: None }
    }
}
