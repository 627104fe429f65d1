use anyhow::{Context, Result};
use footfall_analytics::crossing::{
    DEFAULT_ANCHOR_TTL, DEFAULT_LINE_OFFSET_PX, DEFAULT_MAX_ANCHORS_PER_LINE, DEFAULT_WORKING_RESOLUTION,
};
use footfall_analytics::{CountingLine, CrossingConfig, Zone};
use footfall_vision::sink::EncoderSettings;
use footfall_vision::source::FfmpegTools;
use footfall_vision::DetectionFilter;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub detector: DetectionFilter,
    #[serde(default)]
    pub crossing: CrossingCfg,
    #[serde(default)]
    pub timeline: TimelineCfg,
    #[serde(default)]
    pub progress: ProgressCfg,
    #[serde(default)]
    pub video: VideoCfg,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub lines: Vec<CountingLine>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CrossingCfg {
    pub line_offset_px: f32,
    pub working_resolution: f32,
    pub max_distance: Option<f32>,
    pub match_distance: Option<f32>,
    pub anchor_ttl: u32,
    pub max_anchors_per_line: usize,
}

impl Default for CrossingCfg {
    fn default() -> Self {
        Self {
            line_offset_px: DEFAULT_LINE_OFFSET_PX,
            working_resolution: DEFAULT_WORKING_RESOLUTION,
            max_distance: None,
            match_distance: None,
            anchor_ttl: DEFAULT_ANCHOR_TTL,
            max_anchors_per_line: DEFAULT_MAX_ANCHORS_PER_LINE,
        }
    }
}

impl CrossingCfg {
    pub fn to_config(&self) -> CrossingConfig {
        let mut c = match self.max_distance {
            Some(d) => CrossingConfig::with_max_distance(d),
            None => CrossingConfig::from_line_offset(self.line_offset_px, self.working_resolution),
        };
        if let Some(m) = self.match_distance {
            c.match_distance = m;
        }
        c.anchor_ttl = self.anchor_ttl;
        c.max_anchors_per_line = self.max_anchors_per_line;
        c
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimelineCfg {
    pub bucket_seconds: f64,
}

impl Default for TimelineCfg {
    fn default() -> Self {
        Self { bucket_seconds: 5.0 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProgressCfg {
    pub report_every_n_frames: u64,
    pub retention_s: u64,
}

impl Default for ProgressCfg {
    fn default() -> Self {
        Self { report_every_n_frames: 30, retention_s: 3600 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VideoCfg {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub fallback_fps: f64,
    pub annotate: bool,
    pub crf: u8,
    pub preset: String,
}

impl Default for VideoCfg {
    fn default() -> Self {
        let tools = FfmpegTools::default();
        let enc = EncoderSettings::default();
        Self { ffmpeg: tools.ffmpeg, ffprobe: tools.ffprobe, fallback_fps: 30.0, annotate: true, crf: enc.crf, preset: enc.preset }
    }
}

impl VideoCfg {
    pub fn tools(&self) -> FfmpegTools {
        FfmpegTools { ffmpeg: self.ffmpeg.clone(), ffprobe: self.ffprobe.clone() }
    }

    pub fn encoder(&self) -> EncoderSettings {
        EncoderSettings { crf: self.crf, preset: self.preset.clone() }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&s).context("parse config toml")
}
