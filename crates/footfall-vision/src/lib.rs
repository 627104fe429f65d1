mod nms;
pub mod doctor;
pub mod overlay;
pub mod replay;
pub mod sink;
pub mod source;

use anyhow::Result;
use footfall_geom::BoundingBox;
use image::RgbImage;
use serde::Deserialize;

pub use overlay::Overlay;
pub use replay::ReplayDetector;
pub use sink::{FfmpegEncoder, FrameSink};
pub use source::{FfmpegSource, FrameSource, SyntheticSource, VideoInfo};

/// One decoded frame. Replay-driven jobs run without pixels.
#[derive(Debug, Clone)]
pub struct Frame {
    /// 1-based, in decode order.
    pub number: u64,
    pub image: Option<RgbImage>,
}

/// Per-frame person detector. Boxes come back normalized to the frame.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>>;
}

impl<F> Detector for F
where
    F: FnMut(&Frame) -> Result<Vec<BoundingBox>> + Send,
{
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>> {
        self(frame)
    }
}

fn default_conf_threshold() -> f32 {
    0.25
}

fn default_nms_iou() -> f32 {
    0.45
}

fn default_max_detections() -> usize {
    300
}

/// Post-processing applied to raw detector output.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionFilter {
    #[serde(default = "default_conf_threshold")]
    pub conf_threshold: f32,
    #[serde(default = "default_nms_iou")]
    pub nms_iou_threshold: f32,
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self {
            conf_threshold: default_conf_threshold(),
            nms_iou_threshold: default_nms_iou(),
            max_detections: default_max_detections(),
        }
    }
}

impl DetectionFilter {
    pub fn apply(&self, dets: Vec<BoundingBox>) -> Vec<BoundingBox> {
        let dets = dets.into_iter().filter(|d| d.confidence >= self.conf_threshold).collect();
        nms::nms_filter(dets, self.nms_iou_threshold, self.max_detections)
    }
}
