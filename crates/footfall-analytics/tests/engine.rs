use footfall_analytics::{CountingLine, CrossingConfig, FrameAnalyzer, InputError, Zone};
use footfall_geom::{BoundingBox, Point};
use footfall_proto::analytics::{Direction, LineCounts, ZoneState};
use footfall_proto::report::TrackingReport;

fn whole_frame() -> Vec<Point> {
    vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(1.0, 1.0), Point::new(0.0, 1.0)]
}

fn person(cx: f32, cy: f32) -> BoundingBox {
    BoundingBox::new(cx - 0.03, cy - 0.06, cx + 0.03, cy + 0.06, 0.8)
}

fn horizontal_door() -> CountingLine {
    CountingLine::new("door", Point::new(0.0, 0.0), Point::new(1.0, 0.0))
}

#[test]
fn whole_frame_scenario() {
    let mut a = FrameAnalyzer::new(
        vec![Zone::presence("staff", whole_frame()), Zone::occupancy("customers", whole_frame(), 0.2)],
        vec![],
        CrossingConfig::default(),
        30.0,
    )
    .unwrap();
    let out = a.process(1, &[BoundingBox::new(0.4, 0.4, 0.6, 0.6, 0.9)]).unwrap();
    assert_eq!(out.record.total_detections, 1);
    assert_eq!(out.record.zone_states, vec![ZoneState::Active(true), ZoneState::Count(1)]);
}

#[test]
fn crossing_is_attributed_to_the_frame_of_the_sign_change() {
    let mut a = FrameAnalyzer::new(vec![], vec![horizontal_door()], CrossingConfig::with_max_distance(0.3), 30.0).unwrap();

    let first = a.process(7, &[BoundingBox::new(0.45, -0.25, 0.55, -0.15, 0.9)]).unwrap();
    assert_eq!(first.record.line_deltas, vec![LineCounts::default()]);

    let second = a.process(8, &[BoundingBox::new(0.45, 0.15, 0.55, 0.25, 0.9)]).unwrap();
    assert_eq!(second.events.len(), 1);
    assert_eq!(second.events[0].direction, Direction::Out);
    assert_eq!(second.record.line_deltas, vec![LineCounts { inbound: 0, outbound: 1 }]);
}

#[test]
fn only_the_crossed_line_counts() {
    let exit = CountingLine::new("exit", Point::new(0.0, 0.8), Point::new(1.0, 0.8));
    let mut a = FrameAnalyzer::new(vec![], vec![horizontal_door(), exit], CrossingConfig::with_max_distance(0.2), 30.0).unwrap();

    let first = a.process(1, &[person(0.5, -0.1)]).unwrap();
    assert!(first.events.is_empty());

    let second = a.process(2, &[person(0.5, 0.1)]).unwrap();
    assert_eq!(second.events.len(), 1);
    assert_eq!(second.events[0].line_index, 0);
    assert_eq!(second.record.line_deltas, vec![LineCounts { inbound: 0, outbound: 1 }, LineCounts::default()]);

    let agg = a.aggregator();
    assert_eq!(agg.totals().lines[1], LineCounts::default());
    assert_eq!(agg.crossings(0).len(), 1);
    assert!(agg.crossings(1).is_empty());
}

#[test]
fn oscillating_subject_is_counted_every_time() {
    let mut a = FrameAnalyzer::new(vec![], vec![horizontal_door()], CrossingConfig::with_max_distance(0.2), 30.0).unwrap();
    let ys = [0.1, -0.1, 0.1, -0.1, 0.1];
    for (i, y) in ys.iter().enumerate() {
        a.process(i as u64 + 1, &[person(0.5, *y)]).unwrap();
    }
    let t = a.aggregator().totals();
    assert_eq!(t.lines[0], LineCounts { inbound: 2, outbound: 2 });
}

#[test]
fn invalid_geometry_is_rejected_up_front() {
    let err = FrameAnalyzer::new(
        vec![],
        vec![CountingLine::new("door", Point::new(0.3, 0.3), Point::new(0.3, 0.3))],
        CrossingConfig::default(),
        30.0,
    )
    .err()
    .unwrap();
    assert_eq!(err, InputError::ZeroLengthLine { line: "door".into() });
}

#[test]
fn non_finite_boxes_are_dropped() {
    let mut a = FrameAnalyzer::new(vec![Zone::occupancy("all", whole_frame(), 0.2)], vec![], CrossingConfig::default(), 30.0).unwrap();
    let out = a.process(1, &[BoundingBox::new(f32::NAN, 0.1, 0.2, 0.2, 0.9), person(0.5, 0.5)]).unwrap();
    assert_eq!(out.record.total_detections, 1);
    assert_eq!(out.record.zone_states, vec![ZoneState::Count(1)]);
}

/// Walks a small crowd through a scene and checks the frame-level invariants
/// plus agreement between the two export encodings.
#[test]
fn exports_agree_on_every_shared_value() {
    let left = vec![Point::new(0.0, 0.0), Point::new(0.5, 0.0), Point::new(0.5, 1.0), Point::new(0.0, 1.0)];
    let mut a = FrameAnalyzer::new(
        vec![Zone::presence("till", left.clone()), Zone::occupancy("left", left, 0.2)],
        vec![CountingLine::new("mid", Point::new(0.0, 0.5), Point::new(1.0, 0.5))],
        CrossingConfig::with_max_distance(0.1),
        10.0,
    )
    .unwrap();

    for f in 1..=120u64 {
        let t = f as f32 / 120.0;
        let mut boxes = vec![person(0.2 + 0.6 * t, 0.3 + 0.4 * t)];
        if f % 3 != 0 {
            boxes.push(person(0.8 - 0.5 * t, 0.95 - 0.6 * t));
        }
        if f > 60 {
            boxes.push(person(0.1, 0.1));
        }
        let out = a.process(f, &boxes).unwrap();
        for s in &out.record.zone_states {
            assert!(s.as_count() <= out.record.total_detections);
        }
    }

    let agg = a.aggregator();
    agg.verify_line_totals().unwrap();
    let mid = agg.totals().lines[0];
    assert!(mid.total() >= 1, "someone walked across the middle line");

    let builder = a.report(120);
    let bundle = builder.export().unwrap();
    let report: TrackingReport = serde_json::from_str(&bundle.json).unwrap();

    let rows: Vec<Vec<String>> = bundle.csv.lines().skip(1).map(|l| l.split(',').map(str::to_string).collect()).collect();
    assert_eq!(rows.len(), report.frames.len());

    let (mut csv_in, mut csv_out) = (0u64, 0u64);
    for (row, frame) in rows.iter().zip(&report.frames) {
        assert_eq!(row[0], frame.frame_number.to_string());
        assert_eq!(row[1], frame.timestamp);
        assert_eq!(row[2], frame.total_detections.to_string());
        assert_eq!(row[3], frame.zone_counts["till"].as_count().to_string());
        assert_eq!(row[4], frame.zone_counts["left"].as_count().to_string());
        assert_eq!(row[5], frame.line_counts["mid"].inbound.to_string());
        assert_eq!(row[6], frame.line_counts["mid"].outbound.to_string());
        csv_in += row[5].parse::<u64>().unwrap();
        csv_out += row[6].parse::<u64>().unwrap();
    }
    assert_eq!(csv_in, report.summary.line_stats["mid"].inbound);
    assert_eq!(csv_out, report.summary.line_stats["mid"].outbound);

    let csv_detections: u64 = rows.iter().map(|r| r[2].parse::<u64>().unwrap()).sum();
    assert_eq!(csv_detections, report.summary.total_detections);

    let bucket_sum: u64 = report.timeline.iter().map(|b| b.total_detections).sum();
    assert_eq!(bucket_sum, report.summary.total_detections);

    // same frame log, same bytes
    assert_eq!(a.report(120).export().unwrap(), bundle);
}
