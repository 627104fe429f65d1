use footfall_geom::{polygon_area, Point, EPSILON};
use std::collections::HashSet;

use crate::config::{CountingLine, Zone};
use crate::error::InputError;

pub fn check_zone(zone: &Zone) -> Result<(), InputError> {
    if zone.name.trim().is_empty() {
        return Err(InputError::EmptyName { kind: "zone" });
    }
    if zone.points.len() < 3 {
        return Err(InputError::TooFewVertices { zone: zone.name.clone(), got: zone.points.len() });
    }
    for p in &zone.points {
        check_point("zone", &zone.name, p)?;
    }
    if polygon_area(&zone.points) <= EPSILON {
        return Err(InputError::DegeneratePolygon { zone: zone.name.clone() });
    }
    let t = zone.overlap_threshold;
    if !(t > 0.0 && t <= 1.0) {
        return Err(InputError::ThresholdOutOfRange { zone: zone.name.clone(), value: t });
    }
    Ok(())
}

pub fn check_line(line: &CountingLine) -> Result<(), InputError> {
    if line.name.trim().is_empty() {
        return Err(InputError::EmptyName { kind: "line" });
    }
    check_point("line", &line.name, &line.start)?;
    check_point("line", &line.name, &line.end)?;
    if line.start.distance(line.end) <= EPSILON {
        return Err(InputError::ZeroLengthLine { line: line.name.clone() });
    }
    Ok(())
}

/// Validates a whole job's geometry, including name uniqueness.
pub fn check_geometry(zones: &[Zone], lines: &[CountingLine]) -> Result<(), InputError> {
    let mut seen = HashSet::new();
    for z in zones {
        check_zone(z)?;
        if !seen.insert(z.name.as_str()) {
            return Err(InputError::DuplicateName { kind: "zone", name: z.name.clone() });
        }
    }
    let mut seen = HashSet::new();
    for l in lines {
        check_line(l)?;
        if !seen.insert(l.name.as_str()) {
            return Err(InputError::DuplicateName { kind: "line", name: l.name.clone() });
        }
    }
    Ok(())
}

fn check_point(kind: &'static str, name: &str, p: &Point) -> Result<(), InputError> {
    let in_range = |v: f32| v.is_finite() && (0.0..=1.0).contains(&v);
    if !in_range(p.x) || !in_range(p.y) {
        return Err(InputError::OutOfBounds { kind, name: name.to_string(), x: p.x, y: p.y });
    }
    Ok(())
}
