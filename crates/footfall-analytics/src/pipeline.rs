use footfall_geom::BoundingBox;
use tracing::{debug, warn};

use crate::aggregate::{FrameAggregator, FrameRecord, ZoneColumn};
use crate::config::{CountingLine, Zone};
use crate::crossing::{CrossingConfig, CrossingEvent, CrossingTracker};
use crate::doctor;
use crate::error::{InputError, StateError};
use crate::report::ReportBuilder;
use crate::zones::ZoneEvaluator;
use footfall_proto::analytics::ZoneKind;

/// Per-job analytics state: zones, crossings and the frame log.
///
/// Frames must be fed strictly in order; nothing here is shared between jobs.
pub struct FrameAnalyzer {
    zones: ZoneEvaluator,
    crossing: CrossingTracker,
    agg: FrameAggregator,
}

pub struct FrameOutcome<'a> {
    pub record: &'a FrameRecord,
    pub events: Vec<CrossingEvent>,
    /// Boxes after sanitizing, as evaluated.
    pub boxes: Vec<BoundingBox>,
}

impl FrameAnalyzer {
    pub fn new(zones: Vec<Zone>, lines: Vec<CountingLine>, crossing: CrossingConfig, fps: f64) -> Result<Self, InputError> {
        doctor::check_geometry(&zones, &lines)?;
        let columns = zones
            .iter()
            .map(|z| ZoneColumn {
                name: z.name.clone(),
                kind: z.kind,
                overlap_threshold: (z.kind == ZoneKind::Occupancy).then_some(z.overlap_threshold),
            })
            .collect();
        let line_names = lines.iter().map(|l| l.name.clone()).collect();
        Ok(Self {
            zones: ZoneEvaluator::new(zones)?,
            crossing: CrossingTracker::new(lines, crossing)?,
            agg: FrameAggregator::new(fps, columns, line_names),
        })
    }

    pub fn zones(&self) -> &[Zone] {
        self.zones.zones()
    }

    pub fn lines(&self) -> impl Iterator<Item = &CountingLine> {
        self.crossing.lines()
    }

    pub fn aggregator(&self) -> &FrameAggregator {
        &self.agg
    }

    pub fn process(&mut self, frame_number: u64, boxes: &[BoundingBox]) -> Result<FrameOutcome<'_>, StateError> {
        let boxes = sanitize(frame_number, boxes);
        let states = self.zones.evaluate(&boxes);
        let events = self.crossing.update(&boxes);
        if !events.is_empty() {
            debug!("frame {}: {} crossing event(s)", frame_number, events.len());
        }
        let record = self.agg.record(frame_number, boxes.len() as u32, states, &events)?;
        Ok(FrameOutcome { record, events, boxes })
    }

    /// Cancels in-flight crossings; returns how many anchors were dropped.
    pub fn release_anchors(&mut self) -> usize {
        self.crossing.release()
    }

    pub fn report(&self, total_frames: u64) -> ReportBuilder<'_> {
        ReportBuilder::new(&self.agg, total_frames)
    }
}

fn sanitize(frame_number: u64, boxes: &[BoundingBox]) -> Vec<BoundingBox> {
    let mut out = Vec::with_capacity(boxes.len());
    for b in boxes {
        if !b.is_finite() {
            warn!("frame {}: dropping non-finite box {:?}", frame_number, b);
            continue;
        }
        out.push(b.ordered());
    }
    out
}
