use anyhow::{Context, Result};
use footfall_geom::BoundingBox;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

use crate::{Detector, Frame};

#[derive(Debug, Deserialize)]
struct ReplayLine {
    frame: u64,
    #[serde(default)]
    boxes: Vec<BoundingBox>,
}

/// Plays back detections recorded as JSON lines,
/// `{"frame": n, "boxes": [{"x1":..,"y1":..,"x2":..,"y2":..,"confidence":..}]}`.
///
/// Frames missing from the file have no detections. Repeated frame numbers
/// accumulate.
#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
    frames: BTreeMap<u64, Vec<BoundingBox>>,
}

impl ReplayDetector {
    pub fn open(path: &Path) -> Result<Self> {
        let f = File::open(path).with_context(|| format!("open detections {}", path.display()))?;
        Self::from_reader(BufReader::new(f)).with_context(|| format!("read detections {}", path.display()))
    }

    pub fn from_reader(r: impl BufRead) -> Result<Self> {
        let mut frames: BTreeMap<u64, Vec<BoundingBox>> = BTreeMap::new();
        for (i, line) in r.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let rec: ReplayLine = serde_json::from_str(line).with_context(|| format!("line {}", i + 1))?;
            anyhow::ensure!(rec.frame > 0, "line {}: frames are numbered from 1", i + 1);
            frames.entry(rec.frame).or_default().extend(rec.boxes);
        }
        debug!("replay: {} frame(s) with detections", frames.len());
        Ok(Self { frames })
    }

    /// Highest frame number present in the file.
    pub fn last_frame(&self) -> Option<u64> {
        self.frames.keys().next_back().copied()
    }
}

impl Detector for ReplayDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>> {
        Ok(self.frames.get(&frame.number).cloned().unwrap_or_default())
    }
}
