//! Ray-casting point-in-polygon tests.

use super::ring::{Coordinate, MultiPolygon, Polygon, Ring};

/// Whether `point` lies exactly on the closed segment `a`-`b` (collinear and
/// within the segment's bounding box).
fn point_on_segment(point: Coordinate, a: Coordinate, b: Coordinate) -> bool {
    let cross = (b.x - a.x) * (point.y - a.y) - (b.y - a.y) * (point.x - a.x);
    if cross.abs() > 1e-9 {
        return false;
    }
    point.x >= a.x.min(b.x) - 1e-12
        && point.x <= a.x.max(b.x) + 1e-12
        && point.y >= a.y.min(b.y) - 1e-12
        && point.y <= a.y.max(b.y) + 1e-12
}

/// Whether `point` lies on any edge of `ring`.
fn point_on_ring_boundary(point: Coordinate, ring: &Ring) -> bool {
    ring.edges().any(|(a, b)| point_on_segment(point, a, b))
}

/// Ray-casting inclusion test. Boundary and vertex points count as inside.
/// Horizontal edges are naturally excluded from the crossing count (half-open
/// edge convention), matching the deterministic tie-break the kernel
/// requires for points on a horizontal segment.
fn point_in_ring(point: Coordinate, ring: &Ring) -> bool {
    if point_on_ring_boundary(point, ring) {
        return true;
    }
    let mut inside = false;
    for (a, b) in ring.edges() {
        let crosses = (a.y > point.y) != (b.y > point.y);
        if crosses {
            let x_intersect = a.x + (point.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if point.x < x_intersect {
                inside = !inside;
            }
        }
    }
    inside
}

/// Point-in-polygon test honoring holes: inside the outer ring AND not
/// strictly inside any hole (a point on a hole's boundary is still
/// considered inside the polygon).
pub fn point_in_polygon(point: Coordinate, polygon: &Polygon) -> bool {
    if !point_in_ring(point, &polygon.outer) {
        return false;
    }
    for hole in &polygon.holes {
        let strictly_inside_hole = point_in_ring(point, hole) && !point_on_ring_boundary(point, hole);
        if strictly_inside_hole {
            return false;
        }
    }
    true
}

/// Point-in-multipolygon test: inside iff inside any constituent polygon.
pub fn point_in_multipolygon(point: Coordinate, multi: &MultiPolygon) -> bool {
    multi.polygons.iter().any(|p| point_in_polygon(point, p))
}
