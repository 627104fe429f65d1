use crate::{BoundingBox, Point};

#[derive(Clone, Copy)]
enum Edge {
    Left(f64),
    Right(f64),
    Bottom(f64),
    Top(f64),
}

impl Edge {
    fn inside(self, p: (f64, f64)) -> bool {
        match self {
            Edge::Left(x) => p.0 >= x,
            Edge::Right(x) => p.0 <= x,
            Edge::Bottom(y) => p.1 >= y,
            Edge::Top(y) => p.1 <= y,
        }
    }

    // Only called when a and b straddle the edge, so the divisor is non-zero.
    fn intersect(self, a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
        match self {
            Edge::Left(x) | Edge::Right(x) => {
                let t = (x - a.0) / (b.0 - a.0);
                (x, a.1 + t * (b.1 - a.1))
            }
            Edge::Bottom(y) | Edge::Top(y) => {
                let t = (y - a.1) / (b.1 - a.1);
                (a.0 + t * (b.0 - a.0), y)
            }
        }
    }
}

/// Sutherland-Hodgman: clips `poly` to the box's rectangle.
///
/// The box is the (convex) clip region, so `poly` may be concave; the
/// result can then contain zero-width bridges, which do not change its
/// shoelace area.
pub fn clip_polygon_to_box(poly: &[Point], bbox: &BoundingBox) -> Vec<Point> {
    let edges = [
        Edge::Left(bbox.x1 as f64),
        Edge::Right(bbox.x2 as f64),
        Edge::Bottom(bbox.y1 as f64),
        Edge::Top(bbox.y2 as f64),
    ];

    let mut output: Vec<(f64, f64)> = poly.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    for edge in edges {
        if output.is_empty() {
            break;
        }
        let input = std::mem::take(&mut output);
        let mut prev = input[input.len() - 1];
        for &cur in &input {
            match (edge.inside(prev), edge.inside(cur)) {
                (true, true) => output.push(cur),
                (true, false) => output.push(edge.intersect(prev, cur)),
                (false, true) => {
                    output.push(edge.intersect(prev, cur));
                    output.push(cur);
                }
                (false, false) => {}
            }
            prev = cur;
        }
    }

    output.into_iter().map(|(x, y)| Point::new(x as f32, y as f32)).collect()
}
