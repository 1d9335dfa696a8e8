//! Geometry Kernel: ring/polygon primitives, point-in-polygon tests, area and
//! boolean set operations, and structural validation.
//!
//! This module has no network or storage dependencies; every other module
//! that needs geometry (the Ingestion Validator, Sanity Checker, Tessellation
//! Prover, PIP Engine) depends on it rather than duplicating geometry math.

pub mod ops;
pub mod pip;
pub mod ring;

pub use ops::{
    difference_area, intersect_area, multipolygon_area, multipolygon_centroid, polygon_area,
    polygon_centroid, ring_area, ring_centroid, union_area, union_area_many, validate_geometry,
    GeometryIssue, GeometryIssueKind, GeometryValidation, Severity,
};
pub use pip::{point_in_multipolygon, point_in_polygon};
pub use ring::{rewind, validate_ring, BoundingBox, Coordinate, MultiPolygon, Polygon, Ring, RingError};
