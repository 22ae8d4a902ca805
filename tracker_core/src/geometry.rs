//! Planar geometry: point-in-polygon and polygon validation.
//!
//! # Boundary convention
//! The ray-casting test uses half-open edge intervals: an edge is crossed
//! when exactly one of its endpoints lies strictly above the query point.
//! For an axis-aligned rectangle this puts the left and bottom edges (lower
//! coordinates) inside and the right and top edges outside. The result only
//! depends on the vertex list, so repeated calls always agree.

use crate::{
    error::{Result, TrackerError},
    types::{FrameBounds, Point},
};

/// Minimum number of vertices of a usable polygon.
pub const MIN_VERTICES: usize = 3;

/// Even-odd ray-casting test. The polygon is implicitly closed
/// (last vertex connects back to the first). Fewer than 3 vertices
/// never contain anything.
pub fn point_in_polygon(point: &Point, vertices: &[Point]) -> bool {
    let n = vertices.len();
    if n < MIN_VERTICES {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let a = &vertices[i];
        let b = &vertices[j];
        // (a.y > y) != (b.y > y) also guarantees a.y != b.y below
        if (a.y > point.y) != (b.y > point.y) {
            let x_cross = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Reject polygons with fewer than 3 vertices or any vertex outside the
/// frame (non-finite coordinates count as outside).
pub fn validate_polygon(points: &[Point], bounds: &FrameBounds) -> Result<()> {
    if points.len() < MIN_VERTICES {
        return Err(TrackerError::InvalidPolygon(format!(
            "need at least {MIN_VERTICES} points, got {}",
            points.len()
        )));
    }
    if let Some((i, p)) = points
        .iter()
        .enumerate()
        .find(|(_, p)| !bounds.contains(p))
    {
        return Err(TrackerError::InvalidPolygon(format!(
            "point {i} ({}, {}) outside [0, {}] x [0, {}]",
            p.x, p.y, bounds.width, bounds.height
        )));
    }
    Ok(())
}

/// Pull a point back into the frame rectangle.
pub fn clamp_to_bounds(p: &Point, bounds: &FrameBounds) -> Point {
    Point::new(p.x.clamp(0.0, bounds.width), p.y.clamp(0.0, bounds.height))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
