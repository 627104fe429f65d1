use footfall_proto::analytics::ZoneState;
use footfall_proto::report::{
    FrameRow, LineStats, Summary, TimelineBucket, TrackingReport, VideoInfo, ZoneBucket, ZoneMeta,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::aggregate::{format_seconds, format_timestamp, FrameAggregator, DEFAULT_BUCKET_SECONDS};

/// Both export encodings of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub json: String,
    pub csv: String,
}

/// Read-only view over an aggregator that renders the export formats.
///
/// Rendering is a pure function of the frame log, so repeated calls
/// produce identical bytes.
pub struct ReportBuilder<'a> {
    agg: &'a FrameAggregator,
    total_frames: u64,
    bucket_seconds: f64,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(agg: &'a FrameAggregator, total_frames: u64) -> Self {
        Self { agg, total_frames, bucket_seconds: DEFAULT_BUCKET_SECONDS }
    }

    pub fn bucket_seconds(mut self, seconds: f64) -> Self {
        self.bucket_seconds = seconds;
        self
    }

    pub fn build(&self) -> TrackingReport {
        let agg = self.agg;
        let fps = agg.fps();
        let zones = agg.zones();
        let lines = agg.lines();
        // decoders may not know the length up front
        let total_frames = self.total_frames.max(agg.last_frame().unwrap_or(0));

        let buckets = agg.buckets(self.bucket_seconds);

        let mut zone_meta = BTreeMap::new();
        for (zi, z) in zones.iter().enumerate() {
            let timeline = buckets
                .iter()
                .map(|b| ZoneBucket {
                    time: format_seconds(b.start_seconds),
                    time_seconds: b.start_seconds,
                    state: b.zone_last[zi],
                    peak: b.zone_peak[zi],
                    mean: b.zone_mean(zi),
                })
                .collect();
            zone_meta.insert(
                z.name.clone(),
                ZoneMeta { kind: z.kind, name: z.name.clone(), overlap_threshold: z.overlap_threshold, timeline },
            );
        }

        let frames = agg
            .records()
            .iter()
            .map(|r| FrameRow {
                frame_number: r.frame_number,
                timestamp: r.timestamp.clone(),
                total_detections: r.total_detections,
                zone_counts: zones.iter().map(|z| z.name.clone()).zip(r.zone_states.iter().copied()).collect(),
                line_counts: lines.iter().cloned().zip(r.line_deltas.iter().copied()).collect(),
            })
            .collect();

        let timeline = buckets
            .iter()
            .map(|b| TimelineBucket {
                index: b.index,
                time: format_seconds(b.start_seconds),
                time_seconds: b.start_seconds,
                first_frame: b.first_frame,
                last_frame: b.last_frame,
                total_detections: b.total_detections,
                max_detections: b.max_detections,
                zones: zones.iter().map(|z| z.name.clone()).zip(b.zone_last.iter().copied()).collect(),
                lines: lines.iter().cloned().zip(b.lines.iter().copied()).collect(),
            })
            .collect();

        let totals = agg.totals();
        let summary = Summary {
            total_detections: totals.detections,
            avg_detections_per_frame: totals.avg_detections(),
            max_detections_per_frame: totals.max_detections,
            zone_total_detections: zones.iter().map(|z| z.name.clone()).zip(totals.zones.iter().copied()).collect(),
            line_stats: lines
                .iter()
                .enumerate()
                .map(|(li, name)| {
                    let c = totals.lines[li];
                    (name.clone(), LineStats { inbound: c.inbound, outbound: c.outbound, events: agg.crossings(li).to_vec() })
                })
                .collect(),
        };

        TrackingReport {
            video_info: VideoInfo {
                total_frames,
                fps,
                duration: format_timestamp(total_frames, fps),
                frames_processed: totals.frames,
            },
            zones: zone_meta,
            frames,
            timeline,
            summary,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.build())
    }

    /// One row per frame: frame, timestamp, detections, a column per zone
    /// (presence as 0/1), then `<line>_in`, `<line>_out` per line.
    pub fn to_csv(&self) -> String {
        let agg = self.agg;
        let mut out = String::new();

        let mut header = vec!["frame".to_string(), "timestamp".into(), "total_detections".into()];
        header.extend(agg.zones().iter().map(|z| z.name.clone()));
        for l in agg.lines() {
            header.push(format!("{}_in", l));
            header.push(format!("{}_out", l));
        }
        push_row(&mut out, header.iter().map(String::as_str));

        for r in agg.records() {
            let mut row = vec![r.frame_number.to_string(), r.timestamp.clone(), r.total_detections.to_string()];
            row.extend(r.zone_states.iter().map(|s| match s {
                ZoneState::Active(a) => (*a as u8).to_string(),
                ZoneState::Count(n) => n.to_string(),
            }));
            for d in &r.line_deltas {
                row.push(d.inbound.to_string());
                row.push(d.outbound.to_string());
            }
            push_row(&mut out, row.iter().map(String::as_str));
        }
        out
    }

    pub fn export(&self) -> serde_json::Result<ExportBundle> {
        Ok(ExportBundle { json: self.to_json()?, csv: self.to_csv() })
    }
}

fn push_row<'s>(out: &mut String, fields: impl Iterator<Item = &'s str>) {
    for (i, f) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if f.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
            let _ = write!(out, "\"{}\"", f.replace('"', "\"\""));
        } else {
            out.push_str(f);
        }
    }
    out.push('\n');
}
