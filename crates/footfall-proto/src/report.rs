use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analytics::{Direction, LineCounts, ZoneKind, ZoneState};

/// Structured export of one processed video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingReport {
    pub video_info: VideoInfo,
    pub zones: BTreeMap<String, ZoneMeta>,
    pub frames: Vec<FrameRow>,
    pub timeline: Vec<TimelineBucket>,
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub total_frames: u64,
    pub fps: f64,
    /// `mm:ss`
    pub duration: String,
    pub frames_processed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneMeta {
    #[serde(rename = "type")]
    pub kind: ZoneKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlap_threshold: Option<f32>,
    pub timeline: Vec<ZoneBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneBucket {
    pub time: String,
    pub time_seconds: f64,
    /// Last observed state in the bucket.
    pub state: ZoneState,
    /// Max count (occupancy) or 1 if active in any frame (presence).
    pub peak: u32,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRow {
    pub frame_number: u64,
    pub timestamp: String,
    pub total_detections: u32,
    pub zone_counts: BTreeMap<String, ZoneState>,
    pub line_counts: BTreeMap<String, LineCounts>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineBucket {
    pub index: u64,
    pub time: String,
    pub time_seconds: f64,
    pub first_frame: u64,
    pub last_frame: u64,
    pub total_detections: u64,
    pub max_detections: u32,
    pub zones: BTreeMap<String, ZoneState>,
    pub lines: BTreeMap<String, LineCounts>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_detections: u64,
    pub avg_detections_per_frame: f64,
    pub max_detections_per_frame: u32,
    pub zone_total_detections: BTreeMap<String, u64>,
    pub line_stats: BTreeMap<String, LineStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStats {
    #[serde(rename = "in")]
    pub inbound: u64,
    #[serde(rename = "out")]
    pub outbound: u64,
    pub events: Vec<CrossingRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossingRecord {
    pub frame: u64,
    pub time: String,
    pub direction: Direction,
    pub in_count: u64,
    pub out_count: u64,
}
