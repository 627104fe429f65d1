use footfall_proto::analytics::{LineCounts, ZoneKind, ZoneState};
use footfall_proto::report::CrossingRecord;
use serde::Serialize;
use tracing::error;

use crate::crossing::CrossingEvent;
use crate::error::StateError;

pub const FALLBACK_FPS: f64 = 30.0;
pub const DEFAULT_BUCKET_SECONDS: f64 = 5.0;

/// `mm:ss` for a frame, minutes unbounded.
pub fn format_timestamp(frame_number: u64, fps: f64) -> String {
    format_seconds(frame_number as f64 / fps)
}

pub fn format_seconds(total_seconds: f64) -> String {
    let total = total_seconds.max(0.0);
    let minutes = (total / 60.0).floor() as u64;
    let seconds = (total % 60.0).floor() as u64;
    format!("{:02}:{:02}", minutes, seconds)
}

/// Immutable per-frame snapshot. Zone and line vectors follow the
/// aggregator's configuration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRecord {
    pub frame_number: u64,
    pub timestamp: String,
    pub total_detections: u32,
    pub zone_states: Vec<ZoneState>,
    pub line_deltas: Vec<LineCounts>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneColumn {
    pub name: String,
    pub kind: ZoneKind,
    pub overlap_threshold: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Totals {
    pub frames: u64,
    pub detections: u64,
    pub max_detections: u32,
    /// Occupancy: summed counts. Presence: active frames.
    pub zones: Vec<u64>,
    pub lines: Vec<LineCounts>,
}

impl Totals {
    pub fn avg_detections(&self) -> f64 {
        if self.frames == 0 { 0.0 } else { self.detections as f64 / self.frames as f64 }
    }
}

/// One fixed-duration slice of the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub index: u64,
    pub start_seconds: f64,
    pub first_frame: u64,
    pub last_frame: u64,
    pub frames: u32,
    pub total_detections: u64,
    pub max_detections: u32,
    pub zone_last: Vec<ZoneState>,
    pub zone_peak: Vec<u32>,
    pub zone_sum: Vec<u64>,
    pub lines: Vec<LineCounts>,
}

impl Bucket {
    pub fn zone_mean(&self, zi: usize) -> f64 {
        if self.frames == 0 { 0.0 } else { self.zone_sum[zi] as f64 / self.frames as f64 }
    }
}

/// Append-only frame log with O(1) running totals.
#[derive(Debug, Clone)]
pub struct FrameAggregator {
    fps: f64,
    zones: Vec<ZoneColumn>,
    lines: Vec<String>,
    records: Vec<FrameRecord>,
    totals: Totals,
    crossings: Vec<Vec<CrossingRecord>>,
}

impl FrameAggregator {
    pub fn new(fps: f64, zones: Vec<ZoneColumn>, lines: Vec<String>) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { FALLBACK_FPS };
        let totals = Totals {
            zones: vec![0; zones.len()],
            lines: vec![LineCounts::default(); lines.len()],
            ..Totals::default()
        };
        let crossings = vec![Vec::new(); lines.len()];
        Self { fps, zones, lines, records: Vec::new(), totals, crossings }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn zones(&self) -> &[ZoneColumn] {
        &self.zones
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    pub fn crossings(&self, line_index: usize) -> &[CrossingRecord] {
        self.crossings.get(line_index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn last_frame(&self) -> Option<u64> {
        self.records.last().map(|r| r.frame_number)
    }

    /// Appends the record for `frame_number`, attributing `events` to it.
    pub fn record(
        &mut self,
        frame_number: u64,
        total_detections: u32,
        zone_states: Vec<ZoneState>,
        events: &[CrossingEvent],
    ) -> Result<&FrameRecord, StateError> {
        if let Some(last) = self.last_frame() {
            if frame_number <= last {
                return Err(fatal(StateError::FrameOrder { last, got: frame_number }));
            }
        }
        if zone_states.len() != self.zones.len() {
            return Err(fatal(StateError::ShapeMismatch {
                what: "zone states",
                frame: frame_number,
                expected: self.zones.len(),
                got: zone_states.len(),
            }));
        }
        for (zone, state) in self.zones.iter().zip(&zone_states) {
            if state.as_count() > total_detections {
                return Err(fatal(StateError::CountExceedsDetections {
                    zone: zone.name.clone(),
                    frame: frame_number,
                    count: state.as_count(),
                    total: total_detections,
                }));
            }
        }

        let mut deltas = vec![LineCounts::default(); self.lines.len()];
        for ev in events {
            let Some(delta) = deltas.get_mut(ev.line_index) else {
                return Err(fatal(StateError::ShapeMismatch {
                    what: "lines",
                    frame: frame_number,
                    expected: self.lines.len(),
                    got: ev.line_index + 1,
                }));
            };
            delta.record(ev.direction);
        }

        let timestamp = format_timestamp(frame_number, self.fps);
        for ev in events {
            let cumulative = &mut self.totals.lines[ev.line_index];
            cumulative.record(ev.direction);
            self.crossings[ev.line_index].push(CrossingRecord {
                frame: frame_number,
                time: timestamp.clone(),
                direction: ev.direction,
                in_count: cumulative.inbound,
                out_count: cumulative.outbound,
            });
        }

        self.totals.frames += 1;
        self.totals.detections += total_detections as u64;
        self.totals.max_detections = self.totals.max_detections.max(total_detections);
        for (sum, state) in self.totals.zones.iter_mut().zip(&zone_states) {
            *sum += state.as_count() as u64;
        }

        self.records.push(FrameRecord {
            frame_number,
            timestamp,
            total_detections,
            zone_states,
            line_deltas: deltas,
        });
        Ok(&self.records[self.records.len() - 1])
    }

    /// Re-derives cumulative line counts from the per-frame deltas.
    pub fn verify_line_totals(&self) -> Result<(), StateError> {
        for (li, name) in self.lines.iter().enumerate() {
            let mut summed = LineCounts::default();
            for r in &self.records {
                summed.add(&r.line_deltas[li]);
            }
            let cumulative = self.totals.lines[li];
            if summed.inbound != cumulative.inbound {
                return Err(fatal(StateError::LineTotalsDiverged {
                    line: name.clone(),
                    direction: "in",
                    cumulative: cumulative.inbound,
                    summed: summed.inbound,
                }));
            }
            if summed.outbound != cumulative.outbound {
                return Err(fatal(StateError::LineTotalsDiverged {
                    line: name.clone(),
                    direction: "out",
                    cumulative: cumulative.outbound,
                    summed: summed.outbound,
                }));
            }
        }
        Ok(())
    }

    /// Groups records into `bucket_seconds` slices by `frame_number / fps`.
    pub fn buckets(&self, bucket_seconds: f64) -> Vec<Bucket> {
        let width = if bucket_seconds.is_finite() && bucket_seconds > 0.0 { bucket_seconds } else { DEFAULT_BUCKET_SECONDS };
        let mut out: Vec<Bucket> = Vec::new();

        for r in &self.records {
            let index = ((r.frame_number as f64 / self.fps) / width).floor() as u64;
            if out.last().map(|b| b.index) != Some(index) {
                out.push(Bucket {
                    index,
                    start_seconds: index as f64 * width,
                    first_frame: r.frame_number,
                    last_frame: r.frame_number,
                    frames: 0,
                    total_detections: 0,
                    max_detections: 0,
                    zone_last: r.zone_states.clone(),
                    zone_peak: vec![0; self.zones.len()],
                    zone_sum: vec![0; self.zones.len()],
                    lines: vec![LineCounts::default(); self.lines.len()],
                });
            }
            let Some(b) = out.last_mut() else { continue };
            b.last_frame = r.frame_number;
            b.frames += 1;
            b.total_detections += r.total_detections as u64;
            b.max_detections = b.max_detections.max(r.total_detections);
            b.zone_last.clone_from(&r.zone_states);
            for (zi, state) in r.zone_states.iter().enumerate() {
                b.zone_peak[zi] = b.zone_peak[zi].max(state.as_count());
                b.zone_sum[zi] += state.as_count() as u64;
            }
            for (acc, delta) in b.lines.iter_mut().zip(&r.line_deltas) {
                acc.add(delta);
            }
        }
        out
    }
}

fn fatal(e: StateError) -> StateError {
    error!("aggregator invariant violated: {}", e);
    e
}
