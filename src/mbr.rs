//! Municipal Boundary Resolver (MBR): resolves a FIPS code to its
//! authoritative municipal polygon plus land/water area.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use thiserror::Error;

use crate::geometry::MultiPolygon;
use crate::ids::Fips;

/// A resolved municipal boundary plus its area figures.
#[derive(Debug, Clone, PartialEq)]
pub struct MunicipalBoundary {
    /// The municipality's polygon(s).
    pub polygon: MultiPolygon,
    /// Land area, in the caller's planar unit.
    pub land_area: f64,
    /// Water area, when the source distinguishes it (flags coastal
    /// jurisdictions for the Tessellation Prover).
    pub water_area: Option<f64>,
    /// Municipality name.
    pub name: String,
    /// State abbreviation.
    pub state: String,
}

/// Failure modes resolving a FIPS to a municipal boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MbrError {
    /// No source has a boundary for this FIPS.
    #[error("no municipal boundary found for FIPS {0}")]
    NotFound(Fips),
    /// The underlying fetch failed (network, timeout, non-2xx).
    #[error("fetch failed for FIPS {0}: {1}")]
    FetchFailed(Fips, String),
    /// The source returned geometry that failed structural validation.
    #[error("invalid geometry for FIPS {0}: {1}")]
    InvalidGeometry(Fips, String),
}

/// Source of authoritative municipal boundary data (a government GIS
/// portal, or a static fixture set in tests).
#[async_trait]
pub trait MunicipalSource: Send + Sync {
    /// Resolve a FIPS to its municipal boundary.
    async fn resolve(&self, fips: &Fips) -> Result<MunicipalBoundary, MbrError>;
}

/// Fixed in-memory [`MunicipalSource`], for tests and offline pipelines
/// seeded from a pre-fetched corpus.
#[derive(Debug, Clone, Default)]
pub struct FixtureMunicipalSource {
    boundaries: HashMap<String, MunicipalBoundary>,
}

impl FixtureMunicipalSource {
    /// Construct an empty fixture source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a boundary for a FIPS code.
    pub fn insert(&mut self, fips: impl Into<String>, boundary: MunicipalBoundary) {
        self.boundaries.insert(fips.into(), boundary);
    }
}

#[async_trait]
impl MunicipalSource for FixtureMunicipalSource {
    async fn resolve(&self, fips: &Fips) -> Result<MunicipalBoundary, MbrError> {
        self.boundaries
            .get(fips.as_str())
            .cloned()
            .ok_or_else(|| MbrError::NotFound(fips.clone()))
    }
}

/// Wraps an inner [`MunicipalSource`] with an LRU cache so repeated
/// resolutions of the same FIPS (common across Tessellation Prover retries
/// within a batch run) don't re-hit the network.
pub struct CachingMunicipalSource<S> {
    inner: S,
    cache: Mutex<LruCache<String, MunicipalBoundary>>,
}

impl<S: MunicipalSource> CachingMunicipalSource<S> {
    /// Wrap `inner`, caching up to `capacity` resolved boundaries.
    pub fn new(inner: S, capacity: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to at least 1");
        Self { inner, cache: Mutex::new(LruCache::new(capacity)) }
    }
}

#[async_trait]
impl<S: MunicipalSource> MunicipalSource for CachingMunicipalSource<S> {
    async fn resolve(&self, fips: &Fips) -> Result<MunicipalBoundary, MbrError> {
        if let Some(hit) = self.cache.lock().get(fips.as_str()).cloned() {
            return Ok(hit);
        }
        let resolved = self.inner.resolve(fips).await?;
        self.cache.lock().put(fips.as_str().to_string(), resolved.clone());
        Ok(resolved)
    }
}

/// Configuration for an HTTP-backed [`MunicipalSource`].
#[derive(Debug, Clone)]
pub struct FetchClientConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Base URL template; `{fips}` is substituted with the FIPS code.
    pub url_template: String,
}

impl FetchClientConfig {
    /// Build from environment variables, falling back to sensible defaults
    /// and logging a warning for anything unset.
    ///
    /// - `MBR_FETCH_TIMEOUT_SECS` (default 30)
    /// - `MBR_URL_TEMPLATE` (default a Census TIGERweb-shaped placeholder)
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("MBR_FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);
        let url_template = std::env::var("MBR_URL_TEMPLATE").unwrap_or_else(|_| {
            tracing::warn!("MBR_URL_TEMPLATE not set, using placeholder template");
            "https://tigerweb.geo.census.gov/place/{fips}.geojson".to_string()
        });
        Self { timeout: Duration::from_secs(timeout_secs), url_template }
    }
}

/// HTTP-backed [`MunicipalSource`] fetching GeoJSON feature documents from a
/// configured government GIS endpoint.
pub struct HttpMunicipalSource {
    client: reqwest::Client,
    config: FetchClientConfig,
}

impl HttpMunicipalSource {
    /// Build a source from an existing [`reqwest::Client`] and config.
    pub fn new(client: reqwest::Client, config: FetchClientConfig) -> Self {
        Self { client, config }
    }

    /// Build a source with a fresh client configured with `config.timeout`.
    pub fn from_config(config: FetchClientConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl MunicipalSource for HttpMunicipalSource {
    async fn resolve(&self, fips: &Fips) -> Result<MunicipalBoundary, MbrError> {
        let url = self.config.url_template.replace("{fips}", fips.as_str());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MbrError::FetchFailed(fips.clone(), e.to_string()))?;
        if !response.status().is_success() {
            return Err(MbrError::FetchFailed(fips.clone(), format!("HTTP {}", response.status())));
        }
        let document: MunicipalSourceDocument = response
            .json()
            .await
            .map_err(|e| MbrError::InvalidGeometry(fips.clone(), e.to_string()))?;
        document.into_boundary(fips)
    }
}

/// Minimal shape of the GeoJSON-like feature document a municipal source
/// endpoint returns.
#[derive(Debug, serde::Deserialize)]
struct MunicipalSourceDocument {
    name: String,
    state: String,
    land_area: f64,
    water_area: Option<f64>,
    polygon: MultiPolygon,
}

impl MunicipalSourceDocument {
    fn into_boundary(self, fips: &Fips) -> Result<MunicipalBoundary, MbrError> {
        for polygon in &self.polygon.polygons {
            crate::geometry::validate_ring(&polygon.outer)
                .map_err(|e| MbrError::InvalidGeometry(fips.clone(), e.to_string()))?;
        }
        Ok(MunicipalBoundary {
            polygon: self.polygon,
            land_area: self.land_area,
            water_area: self.water_area,
            name: self.name,
            state: self.state,
        })
    }
}

/// Shared handle to any [`MunicipalSource`], for composing storage seams
/// without generic parameters leaking through the Ingestion Validator.
pub type SharedMunicipalSource = Arc<dyn MunicipalSource>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Coordinate, Polygon, Ring};

    fn square_boundary() -> MunicipalBoundary {
        MunicipalBoundary {
            polygon: MultiPolygon::single(Polygon::new(
                Ring::new(vec![
                    Coordinate::new(0.0, 0.0),
                    Coordinate::new(1.0, 0.0),
                    Coordinate::new(1.0, 1.0),
                    Coordinate::new(0.0, 1.0),
                    Coordinate::new(0.0, 0.0),
                ]),
                Vec::new(),
            )),
            land_area: 1.0,
            water_area: None,
            name: "Example City".to_string(),
            state: "WI".to_string(),
        }
    }

    #[tokio::test]
    async fn fixture_source_resolves_registered_fips() {
        let mut source = FixtureMunicipalSource::new();
        source.insert("5553000", square_boundary());
        let resolved = source.resolve(&Fips::new("5553000").unwrap()).await.unwrap();
        assert_eq!(resolved.name, "Example City");
    }

    #[tokio::test]
    async fn fixture_source_reports_not_found() {
        let source = FixtureMunicipalSource::new();
        let result = source.resolve(&Fips::new("0000000").unwrap()).await;
        assert!(matches!(result, Err(MbrError::NotFound(_))));
    }

    #[tokio::test]
    async fn caching_source_serves_repeated_calls_without_reinserting() {
        let mut inner = FixtureMunicipalSource::new();
        inner.insert("5553000", square_boundary());
        let cached = CachingMunicipalSource::new(inner, 10);
        let first = cached.resolve(&Fips::new("5553000").unwrap()).await.unwrap();
        let second = cached.resolve(&Fips::new("5553000").unwrap()).await.unwrap();
        assert_eq!(first, second);
    }
}
