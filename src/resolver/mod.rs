//! Point-in-Polygon Engine and Boundary Resolver: bbox-prefiltered ray
//! casting, precision-ordered multi-tier results, a geocoder seam, temporal
//! validity filtering, and an LRU+TTL resolution cache.

pub mod engine;
pub mod geocoder;
pub mod cache;

pub use engine::{at_precision, find_containing_boundaries, find_finest};
pub use geocoder::{GeocodeResult, Geocoder, GeocoderError};
pub use cache::{CacheKey, ResolutionCache};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::boundary::{Boundary, BoundaryStore};
use crate::geometry::Coordinate;

/// Closed error taxonomy for the Boundary Resolver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    /// The geocoder failed to resolve the address at all.
    #[error("geocode failed: {0}")]
    GeocodeFailed(String),
    /// The geocoder resolved the address but confidence was below threshold.
    #[error("geocode confidence {confidence} below threshold {threshold}")]
    LowConfidence {
        /// Returned confidence, 0-100.
        confidence: u8,
        /// The configured minimum.
        threshold: u8,
    },
    /// No boundary contains the resolved point.
    #[error("no boundary matched the resolved point")]
    NoBoundaryMatch,
    /// The underlying boundary data source failed.
    #[error("data source unavailable: {0}")]
    DataSourceUnavailable(String),
}

/// Configuration governing one resolver instance.
#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    /// Minimum geocode confidence accepted, 0-100.
    pub min_geocode_confidence: u8,
    /// Maximum number of entries the resolution cache holds.
    pub cache_capacity: usize,
    /// Per-entry cache time-to-live.
    pub cache_ttl: std::time::Duration,
    /// Decimal-degree rounding applied to `(lat, lng)` cache keys.
    pub coordinate_cache_precision: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_geocode_confidence: 80,
            cache_capacity: 1024,
            cache_ttl: std::time::Duration::from_secs(3600),
            coordinate_cache_precision: 5,
        }
    }
}

/// One resolved boundary match, at a specific precision.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryMatch {
    /// The matched boundary.
    pub boundary: Boundary,
    /// Whether this result was served from the resolution cache.
    pub cached: bool,
}

/// Composes a [`Geocoder`], a [`BoundaryStore`], and a [`ResolutionCache`]
/// into the full address/coordinate-to-boundary resolution pipeline.
pub struct BoundaryResolver<G, S> {
    geocoder: G,
    store: Arc<S>,
    config: ResolverConfig,
    cache: ResolutionCache,
}

impl<G, S> BoundaryResolver<G, S>
where
    G: Geocoder,
    S: BoundaryStore,
{
    /// Construct a resolver over the given collaborators.
    pub fn new(geocoder: G, store: Arc<S>, config: ResolverConfig) -> Self {
        let cache = ResolutionCache::new(config.cache_capacity, config.cache_ttl);
        Self { geocoder, store, config, cache }
    }

    /// Resolve a free-text address to the finest-precision boundary
    /// containing it, filtered to those valid `at`.
    pub async fn resolve_address(&self, address: &str, at: DateTime<Utc>) -> Result<BoundaryMatch, ResolveError> {
        let key = CacheKey::Address(normalize_address(address));
        if let Some(hit) = self.cache.get(&key) {
            return Ok(BoundaryMatch { boundary: hit, cached: true });
        }

        let geocoded = self
            .geocoder
            .geocode(address)
            .await
            .map_err(|e| ResolveError::GeocodeFailed(e.to_string()))?;
        if geocoded.confidence < self.config.min_geocode_confidence {
            return Err(ResolveError::LowConfidence { confidence: geocoded.confidence, threshold: self.config.min_geocode_confidence });
        }

        let boundary = self.resolve_point(Coordinate::new(geocoded.lng, geocoded.lat), at).await?;
        self.cache.put(key, boundary.clone());
        Ok(BoundaryMatch { boundary, cached: false })
    }

    /// Resolve a raw coordinate to the finest-precision boundary containing
    /// it, filtered to those valid `at`.
    pub async fn resolve_coordinate(&self, point: Coordinate, at: DateTime<Utc>) -> Result<BoundaryMatch, ResolveError> {
        let key = CacheKey::Coordinate(quantize(point, self.config.coordinate_cache_precision));
        if let Some(hit) = self.cache.get(&key) {
            return Ok(BoundaryMatch { boundary: hit, cached: true });
        }
        let boundary = self.resolve_point(point, at).await?;
        self.cache.put(key, boundary.clone());
        Ok(BoundaryMatch { boundary, cached: false })
    }

    async fn resolve_point(&self, point: Coordinate, at: DateTime<Utc>) -> Result<Boundary, ResolveError> {
        let candidates = self
            .store
            .candidates_near(point)
            .await
            .map_err(|e| ResolveError::DataSourceUnavailable(e.to_string()))?;
        let temporally_valid: Vec<Boundary> = candidates.into_iter().filter(|b| b.validity.contains(at)).collect();
        let matches = find_containing_boundaries(point, &temporally_valid);
        matches.into_iter().next().cloned().ok_or(ResolveError::NoBoundaryMatch)
    }

    /// Empty the resolution cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn quantize(point: Coordinate, precision: u32) -> (i64, i64) {
    let scale = 10f64.powi(precision as i32);
    ((point.x * scale).round() as i64, (point.y * scale).round() as i64)
}
