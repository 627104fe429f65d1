//! Identity-free line crossing.
//!
//! Each counting line keeps a handful of short-lived anchors: recent detection
//! positions seen near the line. Every frame, detections near the line are
//! greedily matched to the closest anchor; a strict change of side between the
//! anchor and its match is a crossing. Nothing survives beyond `anchor_ttl`
//! unmatched frames, and nothing is shared between lines.
//!
//! A subject that oscillates across a line is counted on every traversal.

use footfall_geom::{crossing_side, distance_to_line, BoundingBox, Point};
use footfall_proto::analytics::Direction;
use tracing::{debug, info};

use crate::config::CountingLine;
use crate::doctor;
use crate::error::InputError;

pub const DEFAULT_LINE_OFFSET_PX: f32 = 15.0;
pub const DEFAULT_WORKING_RESOLUTION: f32 = 640.0;
pub const DEFAULT_ANCHOR_TTL: u32 = 10;
pub const DEFAULT_MAX_ANCHORS_PER_LINE: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct CrossingConfig {
    /// Normalized distance from the line under which a detection is tracked.
    pub max_distance: f32,
    /// Largest anchor-to-detection jump accepted as the same subject.
    pub match_distance: f32,
    /// Unmatched frames an anchor survives.
    pub anchor_ttl: u32,
    pub max_anchors_per_line: usize,
}

impl CrossingConfig {
    /// `max_distance = 3 x line_offset`, with the pixel offset scaled to the
    /// working resolution; anchors may jump twice that between frames.
    pub fn from_line_offset(line_offset_px: f32, working_resolution: f32) -> Self {
        let max_distance = 3.0 * line_offset_px / working_resolution.max(1.0);
        Self::with_max_distance(max_distance)
    }

    pub fn with_max_distance(max_distance: f32) -> Self {
        Self {
            max_distance,
            match_distance: 2.0 * max_distance,
            anchor_ttl: DEFAULT_ANCHOR_TTL,
            max_anchors_per_line: DEFAULT_MAX_ANCHORS_PER_LINE,
        }
    }

    pub fn validate(&self) -> Result<(), InputError> {
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !positive(self.max_distance) {
            return Err(InputError::CrossingParam { param: "max_distance", value: self.max_distance });
        }
        if !positive(self.match_distance) {
            return Err(InputError::CrossingParam { param: "match_distance", value: self.match_distance });
        }
        if self.max_anchors_per_line == 0 {
            return Err(InputError::CrossingParam { param: "max_anchors_per_line", value: 0.0 });
        }
        Ok(())
    }
}

impl Default for CrossingConfig {
    fn default() -> Self {
        Self::from_line_offset(DEFAULT_LINE_OFFSET_PX, DEFAULT_WORKING_RESOLUTION)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossingEvent {
    pub line_index: usize,
    pub line: String,
    pub direction: Direction,
    pub position: Point,
}

#[derive(Debug, Clone)]
struct Anchor {
    id: u64,
    position: Point,
    /// Last non-zero side seen, 0 until one is.
    side: i8,
    age: u32,
}

#[derive(Debug, Clone)]
struct LineAnchors {
    line: CountingLine,
    anchors: Vec<Anchor>,
}

#[derive(Debug, Clone)]
pub struct CrossingTracker {
    cfg: CrossingConfig,
    lines: Vec<LineAnchors>,
    next_id: u64,
}

impl CrossingTracker {
    pub fn new(lines: Vec<CountingLine>, cfg: CrossingConfig) -> Result<Self, InputError> {
        doctor::check_geometry(&[], &lines)?;
        cfg.validate()?;
        let lines = lines.into_iter().map(|line| LineAnchors { line, anchors: Vec::new() }).collect();
        Ok(Self { cfg, lines, next_id: 1 })
    }

    pub fn config(&self) -> &CrossingConfig {
        &self.cfg
    }

    pub fn lines(&self) -> impl Iterator<Item = &CountingLine> {
        self.lines.iter().map(|l| &l.line)
    }

    pub fn anchor_count(&self, line_index: usize) -> usize {
        self.lines.get(line_index).map(|l| l.anchors.len()).unwrap_or(0)
    }

    /// Feeds one frame's detections; returns the crossings observed in it.
    pub fn update(&mut self, boxes: &[BoundingBox]) -> Vec<CrossingEvent> {
        let centroids: Vec<Point> = boxes.iter().map(|b| b.centroid()).collect();
        let mut events = Vec::new();
        for idx in 0..self.lines.len() {
            self.update_line(idx, &centroids, &mut events);
        }
        events
    }

    /// Drops every anchor without emitting anything. Returns how many went.
    pub fn release(&mut self) -> usize {
        let n = self.lines.iter().map(|l| l.anchors.len()).sum();
        for l in &mut self.lines {
            l.anchors.clear();
        }
        n
    }

    fn update_line(&mut self, idx: usize, centroids: &[Point], events: &mut Vec<CrossingEvent>) {
        let cfg = &self.cfg;
        let entry = &mut self.lines[idx];
        let (start, end) = (entry.line.start, entry.line.end);

        // detection indices stay ascending, which makes ties resolve to the lowest
        let near: Vec<Point> = centroids
            .iter()
            .copied()
            .filter(|c| distance_to_line(*c, start, end) <= cfg.max_distance)
            .collect();

        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for (ai, a) in entry.anchors.iter().enumerate() {
            for (ni, p) in near.iter().enumerate() {
                let d = a.position.distance(*p);
                if d <= cfg.match_distance {
                    pairs.push((d, ai, ni));
                }
            }
        }
        pairs.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)).then(x.2.cmp(&y.2)));

        let mut anchor_matched = vec![false; entry.anchors.len()];
        let mut det_used = vec![false; near.len()];
        let mut retired = vec![false; entry.anchors.len()];
        let mut spawn: Vec<(Point, i8)> = Vec::new();

        for (_, ai, ni) in pairs {
            if anchor_matched[ai] || det_used[ni] {
                continue;
            }
            anchor_matched[ai] = true;
            det_used[ni] = true;

            let p = near[ni];
            let new_side = crossing_side(start, end, p);
            let anchor = &mut entry.anchors[ai];

            if anchor.side * new_side < 0 {
                let direction = if anchor.side > 0 { Direction::In } else { Direction::Out };
                info!(
                    "line '{}': crossing {} (anchor {} at ({:.3},{:.3}) -> ({:.3},{:.3}))",
                    entry.line.name, direction.as_str(), anchor.id,
                    anchor.position.x, anchor.position.y, p.x, p.y
                );
                events.push(CrossingEvent { line_index: idx, line: entry.line.name.clone(), direction, position: p });
                retired[ai] = true;
                spawn.push((p, new_side));
            } else {
                anchor.position = p;
                if new_side != 0 {
                    anchor.side = new_side;
                }
                anchor.age = 0;
            }
        }

        for (ai, a) in entry.anchors.iter_mut().enumerate() {
            if !anchor_matched[ai] {
                a.age += 1;
            }
        }

        let ttl = cfg.anchor_ttl;
        let mut ai = 0;
        entry.anchors.retain(|a| {
            let keep = !retired[ai] && a.age <= ttl;
            ai += 1;
            keep
        });

        for (ni, p) in near.iter().enumerate() {
            if !det_used[ni] {
                spawn.push((*p, crossing_side(start, end, *p)));
            }
        }

        for (position, side) in spawn {
            if entry.anchors.len() >= cfg.max_anchors_per_line {
                debug!("line '{}': anchor cap {} reached", entry.line.name, cfg.max_anchors_per_line);
                break;
            }
            entry.anchors.push(Anchor { id: self.next_id, position, side, age: 0 });
            self.next_id += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn horizontal() -> CountingLine {
        CountingLine::new("door", Point::new(0.0, 0.0), Point::new(1.0, 0.0))
    }

    fn at(x: f32, y: f32) -> BoundingBox {
        BoundingBox::new(x - 0.02, y - 0.02, x + 0.02, y + 0.02, 0.9)
    }

    fn tracker(max_distance: f32) -> CrossingTracker {
        CrossingTracker::new(vec![horizontal()], CrossingConfig::with_max_distance(max_distance)).unwrap()
    }

    #[test]
    fn single_traversal_fires_once_then_reverse_fires_opposite() {
        let mut t = tracker(0.15);
        assert!(t.update(&[at(0.5, 0.1)]).is_empty());
        let ev = t.update(&[at(0.5, -0.1)]);
        assert_eq!(ev.len(), 1);
        assert_eq!(ev[0].direction, Direction::In);

        // staying on the far side is not another crossing
        assert!(t.update(&[at(0.5, -0.12)]).is_empty());

        let back = t.update(&[at(0.5, 0.1)]);
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].direction, Direction::Out);
    }

    #[test]
    fn crossing_upward_is_out() {
        let mut t = tracker(0.3);
        assert!(t.update(&[at(0.5, -0.2)]).is_empty());
        let ev = t.update(&[at(0.5, 0.2)]);
        assert_eq!(ev.len(), 1);
        assert_eq!(ev[0].direction, Direction::Out);
        assert_eq!(ev[0].line, "door");
    }

    #[test]
    fn landing_on_the_line_does_not_fire() {
        let mut t = tracker(0.3);
        t.update(&[at(0.5, -0.1)]);
        assert!(t.update(&[at(0.5, 0.0)]).is_empty());
        // the anchor remembers the side it came from
        let ev = t.update(&[at(0.5, 0.1)]);
        assert_eq!(ev.len(), 1);
        assert_eq!(ev[0].direction, Direction::Out);
    }

    #[test]
    fn far_detections_are_ignored() {
        let mut t = tracker(0.1);
        t.update(&[at(0.5, 0.5)]);
        t.update(&[at(0.5, -0.5)]);
        assert_eq!(t.anchor_count(0), 0);
    }

    #[test]
    fn crossing_past_the_drawn_end_still_counts() {
        // proximity and side both use the extended line
        let line = CountingLine::new("door", Point::new(0.2, 0.5), Point::new(0.4, 0.5));
        let mut t = CrossingTracker::new(vec![line], CrossingConfig::with_max_distance(0.1)).unwrap();
        assert!(t.update(&[at(0.8, 0.45)]).is_empty());
        assert_eq!(t.anchor_count(0), 1);
        let ev = t.update(&[at(0.8, 0.55)]);
        assert_eq!(ev.len(), 1);
        assert_eq!(ev[0].direction, Direction::Out);
    }

    #[test]
    fn anchors_expire_after_ttl() {
        let mut cfg = CrossingConfig::with_max_distance(0.3);
        cfg.anchor_ttl = 2;
        let mut t = CrossingTracker::new(vec![horizontal()], cfg).unwrap();
        t.update(&[at(0.5, -0.1)]);
        t.update(&[]);
        t.update(&[]);
        assert_eq!(t.anchor_count(0), 1);
        t.update(&[]);
        assert_eq!(t.anchor_count(0), 0);
        // a fresh anchor cannot fire on its own
        assert!(t.update(&[at(0.5, 0.1)]).is_empty());
    }

    #[test]
    fn tie_goes_to_lowest_detection_index() {
        // dyadic coordinates keep both distances bit-identical
        let exact = |x: f32, y: f32| BoundingBox::new(x - 0.0625, y - 0.0625, x + 0.0625, y + 0.0625, 0.9);
        let mut t = tracker(0.3);
        t.update(&[exact(0.5, -0.125)]);
        let ev = t.update(&[exact(0.25, 0.125), exact(0.75, 0.125)]);
        assert_eq!(ev.len(), 1);
        assert_eq!(ev[0].position.x, 0.25);
        // the unmatched detection became its own anchor
        assert_eq!(t.anchor_count(0), 2);
    }

    #[test]
    fn two_people_crossing_opposite_ways() {
        let mut t = tracker(0.3);
        t.update(&[at(0.2, -0.1), at(0.8, 0.1)]);
        let mut ev = t.update(&[at(0.2, 0.1), at(0.8, -0.1)]);
        ev.sort_by(|a, b| a.position.x.total_cmp(&b.position.x));
        assert_eq!(ev.len(), 2);
        assert_eq!(ev[0].direction, Direction::Out);
        assert_eq!(ev[1].direction, Direction::In);
    }

    #[test]
    fn lines_keep_separate_anchors() {
        let exit = CountingLine::new("exit", Point::new(0.0, 0.8), Point::new(1.0, 0.8));
        let mut t = CrossingTracker::new(vec![horizontal(), exit], CrossingConfig::with_max_distance(0.3)).unwrap();
        t.update(&[at(0.5, -0.1)]);
        assert_eq!((t.anchor_count(0), t.anchor_count(1)), (1, 0));

        let ev = t.update(&[at(0.5, 0.1)]);
        assert_eq!(ev.len(), 1);
        assert_eq!((ev[0].line_index, ev[0].line.as_str()), (0, "door"));
        assert_eq!(t.anchor_count(1), 0);
    }

    #[test]
    fn release_drops_anchors_silently() {
        let mut t = tracker(0.3);
        t.update(&[at(0.5, -0.1), at(0.1, 0.1)]);
        assert_eq!(t.release(), 2);
        assert!(t.update(&[at(0.5, 0.1)]).is_empty());
    }

    #[test]
    fn default_distance_scales_with_resolution() {
        let cfg = CrossingConfig::from_line_offset(15.0, 640.0);
        assert!((cfg.max_distance - 45.0 / 640.0).abs() < 1e-6);
        assert!((cfg.match_distance - 2.0 * cfg.max_distance).abs() < 1e-6);
    }
}
