//! Planar geometry on normalized image coordinates.
//!
//! Everything here works in the `[0, 1]` image square; callers map to pixel
//! space only for drawing. Functions are pure and allocation-light so they can
//! run per detection, per zone, per frame.

mod clip;

use serde::{Deserialize, Serialize};

pub use clip::clip_polygon_to_box;

/// Below this, an area or a cross product is treated as zero.
pub const EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance(&self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned detection box, normalized, with the detector's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Self {
        Self { x1, y1, x2, y2, confidence }
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    /// Orders the corners so `x1 <= x2` and `y1 <= y2`.
    pub fn ordered(self) -> Self {
        Self {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
            confidence: self.confidence,
        }
    }

    /// Corners clamped into the unit square.
    pub fn clamped(self) -> Self {
        Self {
            x1: self.x1.clamp(0.0, 1.0),
            y1: self.y1.clamp(0.0, 1.0),
            x2: self.x2.clamp(0.0, 1.0),
            y2: self.y2.clamp(0.0, 1.0),
            confidence: self.confidence,
        }
    }

    pub fn centroid(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let iw = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let ih = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = iw * ih;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}

/// Signed shoelace area; positive for counter-clockwise vertex order
/// in a y-up frame.
pub fn signed_area(poly: &[Point]) -> f32 {
    if poly.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0f64;
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        acc += poly[j].x as f64 * poly[i].y as f64 - poly[i].x as f64 * poly[j].y as f64;
        j = i;
    }
    (acc / 2.0) as f32
}

pub fn polygon_area(poly: &[Point]) -> f32 {
    signed_area(poly).abs()
}

/// Even-odd ray casting over the closed vertex ring.
///
/// A point lying on an edge or a vertex counts as inside. Polygons with
/// fewer than three vertices contain nothing.
pub fn point_in_polygon(p: Point, poly: &[Point]) -> bool {
    let n = poly.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        if on_segment(p, poly[j], poly[i]) {
            return true;
        }
        j = i;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (poly[i].x, poly[i].y);
        let (xj, yj) = (poly[j].x, poly[j].y);
        if (yi > p.y) != (yj > p.y) {
            let x_cross = (xj - xi) * (p.y - yi) / (yj - yi) + xi;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(p: Point, a: Point, b: Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross.abs() > EPSILON {
        return false;
    }
    p.x >= a.x.min(b.x) - EPSILON
        && p.x <= a.x.max(b.x) + EPSILON
        && p.y >= a.y.min(b.y) - EPSILON
        && p.y <= a.y.max(b.y) + EPSILON
}

/// Fraction of the box's area that lies inside the polygon, in `[0, 1]`.
///
/// A zero-area box degenerates to a point test on its centroid.
pub fn bbox_polygon_overlap_ratio(bbox: &BoundingBox, poly: &[Point]) -> f32 {
    if poly.len() < 3 {
        return 0.0;
    }
    let box_area = bbox.area();
    if box_area <= EPSILON * EPSILON {
        return if point_in_polygon(bbox.centroid(), poly) { 1.0 } else { 0.0 };
    }

    let clipped = clip_polygon_to_box(poly, bbox);
    let ratio = polygon_area(&clipped) / box_area;
    if ratio >= 1.0 - EPSILON {
        1.0
    } else if ratio <= EPSILON {
        0.0
    } else {
        ratio
    }
}

/// Sign of `(end - start) x (p - start)`: `+1`, `-1`, or `0` on the line.
pub fn crossing_side(start: Point, end: Point, p: Point) -> i8 {
    let cross = (end.x - start.x) * (p.y - start.y) - (end.y - start.y) * (p.x - start.x);
    if cross > 0.0 {
        1
    } else if cross < 0.0 {
        -1
    } else {
        0
    }
}

/// Perpendicular distance from `p` to the infinite line through `start` and
/// `end`. A zero-length line falls back to the distance to `start`.
pub fn distance_to_line(p: Point, start: Point, end: Point) -> f32 {
    let length = start.distance(end);
    if length <= EPSILON {
        return p.distance(start);
    }
    let cross = (end.x - start.x) * (p.y - start.y) - (end.y - start.y) * (p.x - start.x);
    cross.abs() / length
}
