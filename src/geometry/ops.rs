//! Area, centroid, boolean set operations, and structural geometry validation.

use super::pip::{point_in_multipolygon, point_in_polygon};
use super::ring::{validate_ring, BoundingBox, Coordinate, MultiPolygon, Polygon, Ring, RingError};

/// Planar area of a ring via the shoelace formula, taking the absolute value
/// (callers needing signed area for winding checks use [`Ring::signed_area`]).
///
/// This is a planar computation on whatever projection the caller supplies;
/// relative accuracy within 1% at district scale is the target, which a
/// local equirectangular-style projection of lon/lat comfortably meets and
/// which this kernel does not attempt to improve on with a true geodesic
/// area formula (out of scope — rendering/editing-grade precision is a
/// non-goal).
pub fn ring_area(ring: &Ring) -> f64 {
    ring.signed_area().abs()
}

/// Polygon area: outer ring area minus the area of every hole.
pub fn polygon_area(polygon: &Polygon) -> f64 {
    let outer = ring_area(&polygon.outer);
    let holes: f64 = polygon.holes.iter().map(ring_area).sum();
    (outer - holes).max(0.0)
}

/// Total area across every constituent polygon. Does not attempt to detect
/// or deduplicate overlaps between constituents (for overlap-aware area use
/// [`union_area`]).
pub fn multipolygon_area(multi: &MultiPolygon) -> f64 {
    multi.polygons.iter().map(polygon_area).sum()
}

/// Centroid of a single ring (ignoring holes), via the standard polygon
/// centroid formula. Returns `None` for a degenerate (zero-area) ring.
pub fn ring_centroid(ring: &Ring) -> Option<Coordinate> {
    let area2 = ring.signed_area() * 2.0;
    if area2.abs() < 1e-12 {
        return None;
    }
    let mut cx = 0.0;
    let mut cy = 0.0;
    for (a, b) in ring.edges() {
        let cross = a.x * b.y - b.x * a.y;
        cx += (a.x + b.x) * cross;
        cy += (a.y + b.y) * cross;
    }
    Some(Coordinate::new(cx / (3.0 * area2), cy / (3.0 * area2)))
}

/// Polygon centroid, approximated from the outer ring (holes are not
/// subtracted from the centroid computation; for district-scale comparisons
/// the outer-ring centroid is an adequate proxy, matching the sanity
/// checker's "configurable threshold" tolerance rather than needing an
/// exact area-weighted composite centroid).
pub fn polygon_centroid(polygon: &Polygon) -> Option<Coordinate> {
    ring_centroid(&polygon.outer)
}

/// Area-weighted centroid across a multipolygon's constituents.
pub fn multipolygon_centroid(multi: &MultiPolygon) -> Option<Coordinate> {
    let mut total_area = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for polygon in &multi.polygons {
        if let Some(c) = polygon_centroid(polygon) {
            let a = polygon_area(polygon);
            total_area += a;
            cx += c.x * a;
            cy += c.y * a;
        }
    }
    if total_area < 1e-12 {
        return None;
    }
    Some(Coordinate::new(cx / total_area, cy / total_area))
}

/// Grid resolution used by the boolean set operations below. Higher values
/// trade CPU time for precision; 512 keeps relative error well under the
/// spec's 1% district-scale adequacy bar for any reasonably-shaped
/// district/municipal boundary pair.
const DEFAULT_GRID_RESOLUTION: usize = 512;

/// Rasterize the combined bounding box of two predicates and count cells
/// satisfying `predicate`, returning an area estimate.
fn rasterize_area(bbox: BoundingBox, resolution: usize, predicate: impl Fn(Coordinate) -> bool) -> f64 {
    let width = bbox.max_x - bbox.min_x;
    let height = bbox.max_y - bbox.min_y;
    if width <= 0.0 || height <= 0.0 {
        return 0.0;
    }
    let cell_w = width / resolution as f64;
    let cell_h = height / resolution as f64;
    let cell_area = cell_w * cell_h;
    let mut count = 0usize;
    for row in 0..resolution {
        let y = bbox.min_y + (row as f64 + 0.5) * cell_h;
        for col in 0..resolution {
            let x = bbox.min_x + (col as f64 + 0.5) * cell_w;
            if predicate(Coordinate::new(x, y)) {
                count += 1;
            }
        }
    }
    count as f64 * cell_area
}

/// Area of the union of two multipolygons, computed by grid rasterization
/// over their combined bounding box (see module doc for the precision
/// rationale: boolean polygon clipping into exact output geometry is not
/// attempted, since every caller in this crate — the Tessellation Prover's
/// axioms — only consumes areas).
pub fn union_area(a: &MultiPolygon, b: &MultiPolygon) -> f64 {
    union_area_many(&[a, b])
}

/// Area of the union of any number of multipolygons.
pub fn union_area_many(parts: &[&MultiPolygon]) -> f64 {
    let bbox = parts
        .iter()
        .filter_map(|m| m.bounding_box())
        .fold(None, |acc: Option<BoundingBox>, b| match acc {
            None => Some(b),
            Some(acc) => Some(acc.union(&b)),
        });
    let Some(bbox) = bbox else { return 0.0 };
    rasterize_area(bbox, DEFAULT_GRID_RESOLUTION, |p| {
        parts.iter().any(|m| point_in_multipolygon(p, m))
    })
}

/// Area of the intersection of two multipolygons.
pub fn intersect_area(a: &MultiPolygon, b: &MultiPolygon) -> f64 {
    let (Some(bbox_a), Some(bbox_b)) = (a.bounding_box(), b.bounding_box()) else {
        return 0.0;
    };
    if !bbox_a.intersects(&bbox_b) {
        return 0.0;
    }
    let bbox = BoundingBox {
        min_x: bbox_a.min_x.max(bbox_b.min_x),
        min_y: bbox_a.min_y.max(bbox_b.min_y),
        max_x: bbox_a.max_x.min(bbox_b.max_x),
        max_y: bbox_a.max_y.min(bbox_b.max_y),
    };
    rasterize_area(bbox, DEFAULT_GRID_RESOLUTION, |p| {
        point_in_multipolygon(p, a) && point_in_multipolygon(p, b)
    })
}

/// Area of `a` minus `b` (the part of `a` not covered by `b`).
pub fn difference_area(a: &MultiPolygon, b: &MultiPolygon) -> f64 {
    let Some(bbox) = a.bounding_box() else { return 0.0 };
    rasterize_area(bbox, DEFAULT_GRID_RESOLUTION, |p| {
        point_in_multipolygon(p, a) && !point_in_multipolygon(p, b)
    })
}

/// Severity of a detected geometry issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    /// The geometry cannot be trusted for PIP/area computations.
    Critical,
    /// The geometry is usable but suspicious.
    Warning,
}

/// Kind of structural issue found in a polygon.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum GeometryIssueKind {
    /// A ring failed [`validate_ring`] (too short or not closed).
    InvalidRing(RingError),
    /// The outer ring self-intersects (including the bowtie case where the
    /// intersection point falls strictly inside the ring's own bbox).
    BowtieOrSelfIntersection,
    /// A hole ring extends outside the outer ring's boundary.
    HoleEscapesOuterRing,
}

/// One structural issue found while validating a polygon.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeometryIssue {
    /// What kind of issue this is.
    pub kind: GeometryIssueKind,
    /// How serious the issue is.
    pub severity: Severity,
    /// A representative coordinate for the issue (e.g. the self-intersection
    /// witness point), when one is available.
    pub location: Option<Coordinate>,
}

/// Aggregate result of validating a polygon's structure.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeometryValidation {
    /// Whether the polygon passed validation with no critical issues.
    pub passed: bool,
    /// Every issue found, in detection order.
    pub issues: Vec<GeometryIssue>,
}

/// Find the intersection point of two segments, if they intersect as proper
/// crossing segments (not merely touching at a shared endpoint).
fn segment_intersection(a1: Coordinate, a2: Coordinate, b1: Coordinate, b2: Coordinate) -> Option<Coordinate> {
    let d1x = a2.x - a1.x;
    let d1y = a2.y - a1.y;
    let d2x = b2.x - b1.x;
    let d2y = b2.y - b1.y;
    let denom = d1x * d2y - d1y * d2x;
    if denom.abs() < 1e-12 {
        return None;
    }
    let t = ((b1.x - a1.x) * d2y - (b1.y - a1.y) * d2x) / denom;
    let u = ((b1.x - a1.x) * d1y - (b1.y - a1.y) * d1x) / denom;
    let eps = 1e-9;
    if t > eps && t < 1.0 - eps && u > eps && u < 1.0 - eps {
        Some(Coordinate::new(a1.x + t * d1x, a1.y + t * d1y))
    } else {
        None
    }
}

/// Detect self-intersection among a ring's non-adjacent edges, returning a
/// witness intersection point when one exists.
fn find_self_intersection(ring: &Ring) -> Option<Coordinate> {
    let edges: Vec<(Coordinate, Coordinate)> = ring.edges().collect();
    let n = edges.len();
    for i in 0..n {
        for j in (i + 1)..n {
            // Adjacent edges share an endpoint by construction; skip them.
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            let (a1, a2) = edges[i];
            let (b1, b2) = edges[j];
            if let Some(p) = segment_intersection(a1, a2, b1, b2) {
                return Some(p);
            }
        }
    }
    None
}

/// Whether a hole ring has any point falling strictly outside the outer
/// ring's boundary.
fn hole_escapes(outer: &Ring, hole: &Ring) -> bool {
    hole.points.iter().any(|&p| !point_in_ring_inclusive(outer, p))
}

fn point_in_ring_inclusive(ring: &Ring, point: Coordinate) -> bool {
    let polygon = Polygon::new(ring.clone(), Vec::new());
    point_in_polygon(point, &polygon)
}

/// Validate a polygon's full structure: ring invariants, self-intersection
/// (including bowties), and hole containment. Aggregates every issue found
/// rather than stopping at the first one, so callers can report a complete
/// diagnostic.
pub fn validate_geometry(polygon: &Polygon) -> GeometryValidation {
    let mut issues = Vec::new();

    if let Err(e) = validate_ring(&polygon.outer) {
        issues.push(GeometryIssue {
            kind: GeometryIssueKind::InvalidRing(e),
            severity: Severity::Critical,
            location: None,
        });
    } else if let Some(witness) = find_self_intersection(&polygon.outer) {
        issues.push(GeometryIssue {
            kind: GeometryIssueKind::BowtieOrSelfIntersection,
            severity: Severity::Critical,
            location: Some(witness),
        });
    }

    for hole in &polygon.holes {
        if let Err(e) = validate_ring(hole) {
            issues.push(GeometryIssue {
                kind: GeometryIssueKind::InvalidRing(e),
                severity: Severity::Critical,
                location: None,
            });
            continue;
        }
        if hole_escapes(&polygon.outer, hole) {
            issues.push(GeometryIssue {
                kind: GeometryIssueKind::HoleEscapesOuterRing,
                severity: Severity::Critical,
                location: hole.points.first().copied(),
            });
        }
    }

    let passed = !issues.iter().any(|i| i.severity == Severity::Critical);
    GeometryValidation { passed, issues }
}
