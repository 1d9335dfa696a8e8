//! Coordinate, ring, polygon and bounding-box primitives.

use serde::{Deserialize, Serialize};

/// A planar coordinate. `x` is longitude-like, `y` is latitude-like; the
/// kernel treats both as plain Cartesian numbers (see [`super::ops::polygon_area`]
/// for the adequacy note on planar-projection area comparisons).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Longitude-like axis.
    pub x: f64,
    /// Latitude-like axis.
    pub y: f64,
}

impl Coordinate {
    /// Construct a coordinate.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A closed linear ring: first and last coordinates are equal, at least 4
/// coordinates total (a minimal triangle plus closing point).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ring {
    /// Ordered boundary coordinates, closed (first == last).
    pub points: Vec<Coordinate>,
}

impl Ring {
    /// Construct a ring without validating it. Use [`validate_ring`] to check
    /// invariants before trusting the result.
    pub fn new(points: Vec<Coordinate>) -> Self {
        Self { points }
    }

    /// Number of coordinates, including the repeated closing point.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the ring has no coordinates at all.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Edges as consecutive coordinate pairs (does not wrap past the last
    /// point; callers rely on the ring already being closed).
    pub fn edges(&self) -> impl Iterator<Item = (Coordinate, Coordinate)> + '_ {
        self.points.windows(2).map(|w| (w[0], w[1]))
    }

    /// Signed area via the shoelace formula. Positive for counter-clockwise
    /// winding, negative for clockwise.
    pub fn signed_area(&self) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        let mut sum = 0.0;
        for (a, b) in self.edges() {
            sum += a.x * b.y - b.x * a.y;
        }
        sum / 2.0
    }

    /// Whether the ring winds counter-clockwise (positive signed area).
    pub fn is_counter_clockwise(&self) -> bool {
        self.signed_area() > 0.0
    }

    /// Reverse point order in place, flipping winding direction.
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// The ring's axis-aligned bounding box, or `None` if empty.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.points.iter().copied())
    }
}

/// Structural error in a single ring.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum RingError {
    /// Fewer than 4 coordinates (a closed ring needs at least a triangle
    /// plus its repeated closing point).
    #[error("ring has {0} coordinates, fewer than the minimum of 4")]
    TooFewCoordinates(usize),
    /// First and last coordinates differ.
    #[error("ring is not closed: first point {first:?} != last point {last:?}")]
    NotClosed {
        /// First coordinate of the ring.
        first: Coordinate,
        /// Last coordinate of the ring.
        last: Coordinate,
    },
}

/// Validate a ring's structural invariants: at least 4 coordinates, and the
/// first and last coordinates are equal.
pub fn validate_ring(ring: &Ring) -> Result<(), RingError> {
    if ring.points.len() < 4 {
        return Err(RingError::TooFewCoordinates(ring.points.len()));
    }
    let first = ring.points[0];
    let last = *ring.points.last().expect("checked non-empty above");
    if first != last {
        return Err(RingError::NotClosed { first, last });
    }
    Ok(())
}

/// Normalize ring winding: outer rings become counter-clockwise, hole rings
/// become clockwise. Mutates in place.
pub fn rewind(ring: &mut Ring, is_hole: bool) {
    let ccw = ring.is_counter_clockwise();
    if is_hole && ccw {
        ring.reverse();
    } else if !is_hole && !ccw {
        ring.reverse();
    }
}

/// A polygon: one outer ring plus zero or more interior (hole) rings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    /// Outer boundary ring.
    pub outer: Ring,
    /// Interior hole rings, each fully contained within `outer`.
    pub holes: Vec<Ring>,
}

impl Polygon {
    /// Construct a polygon from an outer ring and hole rings.
    pub fn new(outer: Ring, holes: Vec<Ring>) -> Self {
        Self { outer, holes }
    }

    /// Normalize winding of the outer ring (CCW) and every hole (CW).
    pub fn rewind(&mut self) {
        rewind(&mut self.outer, false);
        for hole in &mut self.holes {
            rewind(hole, true);
        }
    }

    /// The polygon's bounding box, computed from the outer ring only (holes
    /// are contained within it by construction).
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.outer.bounding_box()
    }
}

/// A collection of polygons treated as one logical feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MultiPolygon {
    /// Constituent polygons.
    pub polygons: Vec<Polygon>,
}

impl MultiPolygon {
    /// Construct from a vector of polygons.
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    /// A multipolygon containing a single polygon.
    pub fn single(polygon: Polygon) -> Self {
        Self { polygons: vec![polygon] }
    }

    /// Union bounding box across all constituent polygons.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.polygons
            .iter()
            .filter_map(Polygon::bounding_box)
            .fold(None, |acc, bbox| match acc {
                None => Some(bbox),
                Some(acc) => Some(acc.union(&bbox)),
            })
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum x (west).
    pub min_x: f64,
    /// Minimum y (south).
    pub min_y: f64,
    /// Maximum x (east).
    pub max_x: f64,
    /// Maximum y (north).
    pub max_y: f64,
}

impl BoundingBox {
    /// Build a bounding box enclosing every supplied point, or `None` if the
    /// iterator is empty.
    pub fn from_points(points: impl Iterator<Item = Coordinate>) -> Option<Self> {
        let mut iter = points;
        let first = iter.next()?;
        let mut bbox = BoundingBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in iter {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        Some(bbox)
    }

    /// Whether this box encloses the given point (inclusive of the edges).
    pub fn contains(&self, point: Coordinate) -> bool {
        point.x >= self.min_x && point.x <= self.max_x && point.y >= self.min_y && point.y <= self.max_y
    }

    /// Whether this box overlaps another (inclusive of shared edges).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Smallest bounding box enclosing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Ring {
        Ring::new(vec![
            Coordinate::new(x0, y0),
            Coordinate::new(x1, y0),
            Coordinate::new(x1, y1),
            Coordinate::new(x0, y1),
            Coordinate::new(x0, y0),
        ])
    }

    #[test]
    fn validate_ring_rejects_short_rings() {
        let ring = Ring::new(vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(0.0, 0.0),
        ]);
        assert_eq!(validate_ring(&ring), Err(RingError::TooFewCoordinates(3)));
    }

    #[test]
    fn validate_ring_rejects_unclosed_rings() {
        let ring = Ring::new(vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(1.0, 1.0),
            Coordinate::new(0.0, 1.0),
        ]);
        assert!(matches!(validate_ring(&ring), Err(RingError::NotClosed { .. })));
    }

    #[test]
    fn validate_ring_accepts_a_closed_square() {
        let ring = square(0.0, 0.0, 1.0, 1.0);
        assert!(validate_ring(&ring).is_ok());
    }

    #[test]
    fn signed_area_is_positive_for_ccw_square() {
        let ring = square(0.0, 0.0, 1.0, 1.0);
        assert!((ring.signed_area() - 1.0).abs() < 1e-9);
        assert!(ring.is_counter_clockwise());
    }

    #[test]
    fn rewind_flips_a_clockwise_outer_ring() {
        let mut ring = square(0.0, 0.0, 1.0, 1.0);
        ring.reverse();
        assert!(!ring.is_counter_clockwise());
        rewind(&mut ring, false);
        assert!(ring.is_counter_clockwise());
    }

    #[test]
    fn bounding_box_encloses_all_points() {
        let ring = square(-1.0, -2.0, 3.0, 4.0);
        let bbox = ring.bounding_box().unwrap();
        assert_eq!(bbox.min_x, -1.0);
        assert_eq!(bbox.min_y, -2.0);
        assert_eq!(bbox.max_x, 3.0);
        assert_eq!(bbox.max_y, 4.0);
    }
}
