//! The `Boundary` data model and the storage seam holding it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{validate_ring, MultiPolygon, Polygon, Ring, RingError};
use crate::ids::{AuthorityLevel, BoundaryId, LayerType};

/// Where a boundary's geometry and metadata came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// URL the geometry was retrieved from.
    pub source_url: String,
    /// When the data was retrieved.
    pub retrieved_at: DateTime<Utc>,
    /// The vintage (e.g. TIGER year) the data represents, when known.
    pub vintage: Option<String>,
    /// Ordered list of processing steps applied after retrieval (e.g.
    /// "reprojected", "winding normalized").
    pub processing_steps: Vec<String>,
    /// License under which the source data was published.
    pub license: Option<String>,
}

impl Provenance {
    /// Construct a provenance record with no processing steps recorded yet.
    pub fn new(source_url: impl Into<String>, retrieved_at: DateTime<Utc>) -> Self {
        Self {
            source_url: source_url.into(),
            retrieved_at,
            vintage: None,
            processing_steps: Vec::new(),
            license: None,
        }
    }

    /// Append a processing step to the record.
    pub fn record_step(&mut self, step: impl Into<String>) {
        self.processing_steps.push(step.into());
    }
}

/// A `[validFrom, validUntil)` interval; `validUntil` is exclusive when
/// present, matching the Boundary Resolver's temporal filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidityInterval {
    /// Start of validity, inclusive.
    pub valid_from: DateTime<Utc>,
    /// End of validity, exclusive, or `None` if still current.
    pub valid_until: Option<DateTime<Utc>>,
}

impl ValidityInterval {
    /// Construct an interval, rejecting `valid_until < valid_from`.
    pub fn new(valid_from: DateTime<Utc>, valid_until: Option<DateTime<Utc>>) -> Result<Self, BoundaryError> {
        if let Some(until) = valid_until {
            if until < valid_from {
                return Err(BoundaryError::InvalidValidityInterval { valid_from, valid_until: until });
            }
        }
        Ok(Self { valid_from, valid_until })
    }

    /// Whether `at` falls within this interval (`validUntil` exclusive).
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        if at < self.valid_from {
            return false;
        }
        match self.valid_until {
            Some(until) => at < until,
            None => true,
        }
    }
}

/// A legislative or municipal boundary: identity, geometry, and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    /// Stable identifier, unique within `layer_type`.
    pub id: BoundaryId,
    /// What kind of boundary this is.
    pub layer_type: LayerType,
    /// Human-readable name.
    pub name: String,
    /// Dotted path of containing jurisdictions, coarsest first
    /// (e.g. `"US.WI.Dane"`).
    pub jurisdiction_path: String,
    /// Closed polygonal geometry.
    pub geometry: MultiPolygon,
    /// Trust tier of the originating source, `0..=5`.
    pub authority_level: AuthorityLevel,
    /// Interval during which this boundary is the valid version.
    pub validity: ValidityInterval,
    /// Retrieval and processing history.
    pub provenance: Provenance,
}

/// Error constructing or validating a [`Boundary`].
#[derive(Debug, Error, PartialEq)]
pub enum BoundaryError {
    /// `validFrom` is after `validUntil`.
    #[error("validFrom {valid_from} is after validUntil {valid_until}")]
    InvalidValidityInterval {
        /// Start of the interval.
        valid_from: DateTime<Utc>,
        /// The offending (earlier) end of the interval.
        valid_until: DateTime<Utc>,
    },
    /// The geometry contains a structurally invalid ring.
    #[error("invalid ring in boundary geometry: {0}")]
    InvalidRing(#[from] RingError),
    /// The geometry has no constituent polygons at all.
    #[error("boundary geometry has no polygons")]
    EmptyGeometry,
}

impl Boundary {
    /// Validate the structural invariants every boundary must hold: every
    /// ring closed and non-degenerate, at least one polygon present. Winding
    /// normalization is the caller's responsibility via
    /// [`crate::geometry::rewind`] before constructing a `Boundary` meant for
    /// a snapshot.
    pub fn validate(&self) -> Result<(), BoundaryError> {
        if self.geometry.polygons.is_empty() {
            return Err(BoundaryError::EmptyGeometry);
        }
        for polygon in &self.geometry.polygons {
            validate_polygon_rings(polygon)?;
        }
        Ok(())
    }

    /// The boundary's bounding box, or `None` if its geometry is empty.
    pub fn bounding_box(&self) -> Option<crate::geometry::BoundingBox> {
        self.geometry.bounding_box()
    }
}

fn validate_polygon_rings(polygon: &Polygon) -> Result<(), BoundaryError> {
    validate_ring(&polygon.outer)?;
    for hole in &polygon.holes {
        validate_ring(hole)?;
    }
    Ok(())
}

/// Convenience constructor for a single-polygon boundary used throughout the
/// crate's tests and fixtures.
pub fn single_polygon_boundary(
    id: impl Into<String>,
    layer_type: LayerType,
    name: impl Into<String>,
    outer: Ring,
    authority_level: AuthorityLevel,
    valid_from: DateTime<Utc>,
) -> Boundary {
    Boundary {
        id: BoundaryId::new(id),
        layer_type,
        name: name.into(),
        jurisdiction_path: String::new(),
        geometry: MultiPolygon::single(Polygon::new(outer, Vec::new())),
        authority_level,
        validity: ValidityInterval { valid_from, valid_until: None },
        provenance: Provenance::new("fixture://local", valid_from),
    }
}

/// Storage seam for boundaries. Implementations must return boundaries in a
/// deterministic order for any method returning a collection.
#[async_trait]
pub trait BoundaryStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync;

    /// Insert or replace a boundary.
    async fn put(&self, boundary: Boundary) -> Result<(), Self::Error>;

    /// Fetch a boundary by id.
    async fn get(&self, id: &BoundaryId) -> Result<Option<Boundary>, Self::Error>;

    /// All boundaries of a given layer type, ordered by id ascending.
    async fn list_by_layer(&self, layer_type: LayerType) -> Result<Vec<Boundary>, Self::Error>;

    /// All boundaries whose bounding box could contain `point`, ordered by
    /// id ascending. A store backed by a spatial index may prefilter here;
    /// the in-memory backend returns every boundary and lets the PIP Engine
    /// do the bbox filtering itself.
    async fn candidates_near(&self, point: crate::geometry::Coordinate) -> Result<Vec<Boundary>, Self::Error>;

    /// Remove a boundary by id. Returns whether it existed.
    async fn remove(&self, id: &BoundaryId) -> Result<bool, Self::Error>;
}

/// Error type for [`InMemoryBoundaryStore`]. Infallible in practice; kept as
/// a real error type so callers don't need to special-case this backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InMemoryBoundaryError {}

/// BTreeMap-backed [`BoundaryStore`] used in tests and for single-process
/// deployments that don't need a shared database.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBoundaryStore {
    inner: std::sync::Arc<parking_lot::RwLock<BTreeMap<BoundaryId, Boundary>>>,
}

impl InMemoryBoundaryStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BoundaryStore for InMemoryBoundaryStore {
    type Error = InMemoryBoundaryError;

    async fn put(&self, boundary: Boundary) -> Result<(), Self::Error> {
        self.inner.write().insert(boundary.id.clone(), boundary);
        Ok(())
    }

    async fn get(&self, id: &BoundaryId) -> Result<Option<Boundary>, Self::Error> {
        Ok(self.inner.read().get(id).cloned())
    }

    async fn list_by_layer(&self, layer_type: LayerType) -> Result<Vec<Boundary>, Self::Error> {
        Ok(self
            .inner
            .read()
            .values()
            .filter(|b| b.layer_type == layer_type)
            .cloned()
            .collect())
    }

    async fn candidates_near(&self, _point: crate::geometry::Coordinate) -> Result<Vec<Boundary>, Self::Error> {
        Ok(self.inner.read().values().cloned().collect())
    }

    async fn remove(&self, id: &BoundaryId) -> Result<bool, Self::Error> {
        Ok(self.inner.write().remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Coordinate;
    use chrono::TimeZone;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Ring {
        Ring::new(vec![
            Coordinate::new(x0, y0),
            Coordinate::new(x1, y0),
            Coordinate::new(x1, y1),
            Coordinate::new(x0, y1),
            Coordinate::new(x0, y0),
        ])
    }

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn validity_interval_rejects_until_before_from() {
        let from = epoch();
        let until = from - chrono::Duration::days(1);
        assert!(ValidityInterval::new(from, Some(until)).is_err());
    }

    #[test]
    fn validity_interval_until_is_exclusive() {
        let from = epoch();
        let until = from + chrono::Duration::days(10);
        let interval = ValidityInterval::new(from, Some(until)).unwrap();
        assert!(interval.contains(until - chrono::Duration::seconds(1)));
        assert!(!interval.contains(until));
    }

    #[test]
    fn validate_rejects_empty_geometry() {
        let boundary = Boundary {
            id: BoundaryId::new("empty"),
            layer_type: LayerType::Municipal,
            name: "Empty".into(),
            jurisdiction_path: String::new(),
            geometry: MultiPolygon::default(),
            authority_level: AuthorityLevel::new(3).unwrap(),
            validity: ValidityInterval { valid_from: epoch(), valid_until: None },
            provenance: Provenance::new("fixture://local", epoch()),
        };
        assert_eq!(boundary.validate(), Err(BoundaryError::EmptyGeometry));
    }

    #[test]
    fn validate_accepts_a_clean_square() {
        let boundary = single_polygon_boundary(
            "city-1",
            LayerType::CityLimits,
            "Example City",
            square(0.0, 0.0, 1.0, 1.0),
            AuthorityLevel::new(4).unwrap(),
            epoch(),
        );
        assert!(boundary.validate().is_ok());
    }

    #[tokio::test]
    async fn in_memory_store_round_trips_a_boundary() {
        let store = InMemoryBoundaryStore::new();
        let boundary = single_polygon_boundary(
            "city-1",
            LayerType::CityLimits,
            "Example City",
            square(0.0, 0.0, 1.0, 1.0),
            AuthorityLevel::new(4).unwrap(),
            epoch(),
        );
        store.put(boundary.clone()).await.unwrap();
        let fetched = store.get(&BoundaryId::new("city-1")).await.unwrap();
        assert_eq!(fetched, Some(boundary));
    }

    #[tokio::test]
    async fn in_memory_store_lists_by_layer() {
        let store = InMemoryBoundaryStore::new();
        let city = single_polygon_boundary(
            "city-1",
            LayerType::CityLimits,
            "Example City",
            square(0.0, 0.0, 1.0, 1.0),
            AuthorityLevel::new(4).unwrap(),
            epoch(),
        );
        let ward = single_polygon_boundary(
            "ward-1",
            LayerType::Ward,
            "Ward One",
            square(0.0, 0.0, 0.5, 0.5),
            AuthorityLevel::new(4).unwrap(),
            epoch(),
        );
        store.put(city).await.unwrap();
        store.put(ward).await.unwrap();
        let wards = store.list_by_layer(LayerType::Ward).await.unwrap();
        assert_eq!(wards.len(), 1);
        assert_eq!(wards[0].id, BoundaryId::new("ward-1"));
    }

    #[tokio::test]
    async fn in_memory_store_remove_reports_existence() {
        let store = InMemoryBoundaryStore::new();
        let boundary = single_polygon_boundary(
            "city-1",
            LayerType::CityLimits,
            "Example City",
            square(0.0, 0.0, 1.0, 1.0),
            AuthorityLevel::new(4).unwrap(),
            epoch(),
        );
        store.put(boundary).await.unwrap();
        assert!(store.remove(&BoundaryId::new("city-1")).await.unwrap());
        assert!(!store.remove(&BoundaryId::new("city-1")).await.unwrap());
    }
}
