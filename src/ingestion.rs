//! Ingestion Validator: the tiered pipeline gating a candidate source
//! through registry checks, structural parsing, sanity checks, and the full
//! tessellation proof.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::geometry::MultiPolygon;
use crate::ids::Fips;
use crate::mbr::{MbrError, MunicipalSource};
use crate::registry::{FailurePattern, RegistryError, RegistryStore};
use crate::sanity::{check_sanity, SanityFailure, SanityResult, SanityThresholds};
use crate::tessellation::{prove_tessellation, AxiomFailure, TessellationExceptions, TessellationInputs, TessellationResult};

/// Fetch-layer failures, closed per the error taxonomy.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    /// The request exceeded its configured timeout.
    #[error("network timeout")]
    NetworkTimeout,
    /// The server responded with a non-2xx status.
    #[error("http error {status}")]
    HttpError {
        /// The response status code.
        status: u16,
    },
    /// The response body could not be parsed as a feature collection.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// A fetched candidate's parsed features: each element is one district's
/// geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCollection {
    /// One multipolygon per feature.
    pub features: Vec<MultiPolygon>,
}

/// Source of raw candidate documents (an HTTP fetcher, or a fixture set in
/// tests).
#[async_trait]
pub trait FeatureSource: Send + Sync {
    /// Fetch and parse the feature collection at `url`.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FeatureCollection, FetchError>;
}

/// Fixed in-memory [`FeatureSource`] for tests.
#[derive(Debug, Clone, Default)]
pub struct FixtureFeatureSource {
    documents: HashMap<String, FeatureCollection>,
}

impl FixtureFeatureSource {
    /// Construct an empty fixture source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document for a URL.
    pub fn insert(&mut self, url: impl Into<String>, collection: FeatureCollection) {
        self.documents.insert(url.into(), collection);
    }
}

#[async_trait]
impl FeatureSource for FixtureFeatureSource {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<FeatureCollection, FetchError> {
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::HttpError { status: 404 })
    }
}

/// HTTP-backed [`FeatureSource`].
pub struct HttpFeatureSource {
    client: reqwest::Client,
}

impl HttpFeatureSource {
    /// Build from an existing [`reqwest::Client`].
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(serde::Deserialize)]
struct RawFeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    features: Vec<MultiPolygon>,
}

#[async_trait]
impl FeatureSource for HttpFeatureSource {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FeatureCollection, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { FetchError::NetworkTimeout } else { FetchError::InvalidPayload(e.to_string()) })?;
        if !response.status().is_success() {
            return Err(FetchError::HttpError { status: response.status().as_u16() });
        }
        let raw: RawFeatureCollection = response.json().await.map_err(|e| FetchError::InvalidPayload(e.to_string()))?;
        if raw.kind != "FeatureCollection" {
            return Err(FetchError::InvalidPayload(format!("unexpected type {}", raw.kind)));
        }
        Ok(FeatureCollection { features: raw.features })
    }
}

/// How far the Ingestion Validator should run for a given call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// Fetch and structurally parse only.
    Structure,
    /// Structure plus the Sanity Checker.
    Sanity,
    /// Structure, Sanity, and the full Tessellation Prover.
    Full,
}

/// Closed validation failure taxonomy for the ingestion surface.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The FIPS is quarantined; no network I/O was performed.
    RegistryQuarantined(FailurePattern),
    /// The FIPS is registered at-large; no districts are expected.
    RegistryAtLarge,
    /// Structural parsing failed (empty, too many features, type mismatch,
    /// missing geometry, or the fetch itself failed).
    StructureInvalid(String),
    /// The Sanity Checker's centroid-proximity check failed.
    SanityCentroid {
        /// Measured distance in kilometers.
        distance_km: f64,
        /// The threshold that was exceeded.
        threshold_km: f64,
    },
    /// The Sanity Checker's feature-count-ratio check failed.
    SanityCount {
        /// `actual / expected`.
        ratio: f64,
        /// The allowed band's upper bound (`[1/max, max]`).
        max_ratio: f64,
    },
    /// The municipal boundary could not be resolved.
    BoundaryUnresolvable(String),
    /// Tessellation Prover cardinality axiom failed.
    AxiomCardinality {
        /// Actual feature count.
        actual: usize,
        /// Expected feature count.
        expected: usize,
    },
    /// Tessellation Prover exclusivity axiom failed.
    AxiomExclusivity {
        /// Total overlap area across all district pairs.
        total_overlap: f64,
    },
    /// Tessellation Prover containment axiom failed.
    AxiomContainment {
        /// Fraction of the union falling outside the municipal boundary.
        outside_ratio: f64,
    },
    /// Tessellation Prover exhaustivity axiom failed.
    AxiomExhaustivity {
        /// `area(union) / area(municipal)`.
        coverage: f64,
    },
}

impl ValidationError {
    /// A one-line remediation hint, from the fixed lookup table every
    /// validation failure must carry.
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            ValidationError::RegistryQuarantined(_) => "FIPS is quarantined; review the quarantine reason before retrying",
            ValidationError::RegistryAtLarge => "FIPS is registered at-large; no district ingestion is expected",
            ValidationError::StructureInvalid(_) => "check source URL and feature collection shape (empty, >100 features, or wrong type)",
            ValidationError::SanityCentroid { .. } => "district centroid is far from the municipal centroid; check for wrong vintage or wrong jurisdiction",
            ValidationError::SanityCount { .. } => "feature count is far from expected; check for wrong granularity or duplicate features",
            ValidationError::BoundaryUnresolvable(_) => "municipal boundary could not be resolved; check the FIPS and MBR source availability",
            ValidationError::AxiomCardinality { .. } => "check for wrong vintage or duplicate features in the source",
            ValidationError::AxiomExclusivity { .. } => "districts overlap; check for duplicate or mis-digitized features",
            ValidationError::AxiomContainment { .. } => "district geometry extends outside the municipal boundary; check for wrong jurisdiction",
            ValidationError::AxiomExhaustivity { .. } => "coverage is outside the expected band; check for wrong granularity or wrong jurisdiction",
        }
    }
}

/// Full outcome of one ingestion validation call.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// Whether validation passed at the requested tier.
    pub valid: bool,
    /// The highest tier actually executed before success or failure.
    pub achieved_tier: Tier,
    /// The failure, if any.
    pub failure: Option<ValidationError>,
    /// A warning when the Full tier ran without a registered expected
    /// count (cardinality was checked against the actual feature count
    /// instead).
    pub warning: Option<String>,
    /// Sanity Checker diagnostics, when the Sanity tier or higher ran.
    pub sanity: Option<SanityResult>,
    /// Tessellation Prover diagnostics, when the Full tier ran.
    pub tessellation: Option<TessellationResult>,
}

impl ValidationResult {
    fn failed(tier: Tier, failure: ValidationError) -> Self {
        Self { valid: false, achieved_tier: tier, failure: Some(failure), warning: None, sanity: None, tessellation: None }
    }
}

/// Validator error surface combining registry and fetch failures that can
/// occur outside the closed [`ValidationError`] taxonomy (e.g. the registry
/// store itself being unreachable).
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The registry store failed.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// The tiered ingestion pipeline.
pub struct IngestionValidator<F, M> {
    feature_source: F,
    municipal_source: M,
    registry: Arc<dyn RegistryStore>,
    fetch_timeout: Duration,
    sanity_thresholds: SanityThresholds,
    tessellation_exceptions: TessellationExceptions,
    /// Maps an incorrectly-assigned county FIPS to the correct city FIPS,
    /// applied before any registry lookup.
    fips_corrections: HashMap<String, String>,
}

impl<F: FeatureSource, M: MunicipalSource> IngestionValidator<F, M> {
    /// Construct a validator over the given collaborators.
    pub fn new(feature_source: F, municipal_source: M, registry: Arc<dyn RegistryStore>) -> Self {
        Self {
            feature_source,
            municipal_source,
            registry,
            fetch_timeout: Duration::from_secs(30),
            sanity_thresholds: SanityThresholds::default(),
            tessellation_exceptions: TessellationExceptions::default(),
            fips_corrections: HashMap::new(),
        }
    }

    /// Register a FIPS correction (county FIPS → city FIPS).
    pub fn with_fips_correction(mut self, wrong: impl Into<String>, correct: impl Into<String>) -> Self {
        self.fips_corrections.insert(wrong.into(), correct.into());
        self
    }

    /// Validate one candidate up to `tier`.
    pub async fn validate(&self, fips: &Fips, url: &str, tier: Tier) -> Result<ValidationResult, IngestionError> {
        let corrected = self.fips_corrections.get(fips.as_str()).cloned();
        let effective_fips = match &corrected {
            Some(c) => Fips::new(c.clone()).unwrap_or_else(|_| fips.clone()),
            None => fips.clone(),
        };

        if let Some(entry) = self.registry.quarantine_entry(effective_fips.as_str()).await? {
            return Ok(ValidationResult::failed(Tier::Structure, ValidationError::RegistryQuarantined(entry.failure_pattern)));
        }
        if self.registry.at_large_entry(effective_fips.as_str()).await?.is_some() {
            return Ok(ValidationResult::failed(Tier::Structure, ValidationError::RegistryAtLarge));
        }

        let features = match self.feature_source.fetch(url, self.fetch_timeout).await {
            Ok(f) => f,
            Err(e) => return Ok(ValidationResult::failed(Tier::Structure, ValidationError::StructureInvalid(e.to_string()))),
        };
        if features.features.is_empty() {
            return Ok(ValidationResult::failed(Tier::Structure, ValidationError::StructureInvalid("empty feature collection".to_string())));
        }
        if features.features.len() > 100 {
            return Ok(ValidationResult::failed(
                Tier::Structure,
                ValidationError::StructureInvalid(format!("{} features exceeds the 100-feature limit (likely wrong granularity)", features.features.len())),
            ));
        }
        for feature in &features.features {
            if feature.polygons.is_empty() {
                return Ok(ValidationResult::failed(Tier::Structure, ValidationError::StructureInvalid("feature missing geometry".to_string())));
            }
        }

        if tier == Tier::Structure {
            return Ok(ValidationResult { valid: true, achieved_tier: Tier::Structure, failure: None, warning: None, sanity: None, tessellation: None });
        }

        let municipal = match self.municipal_source.resolve(&effective_fips).await {
            Ok(m) => m,
            Err(e) => return Ok(ValidationResult::failed(Tier::Sanity, ValidationError::BoundaryUnresolvable(mbr_error_message(e)))),
        };

        let expected = self.registry.expected_count(effective_fips.as_str()).await?;
        let expected_count = expected.as_ref().map(|e| e.expected_count as usize).unwrap_or(features.features.len());

        let sanity = check_sanity(
            &combine(&features.features),
            &municipal.polygon,
            features.features.len(),
            expected_count,
            self.sanity_thresholds,
        );
        if !sanity.passed {
            let failure = match sanity.failure {
                Some(SanityFailure::CentroidTooFar { distance_km, threshold_km }) => ValidationError::SanityCentroid { distance_km, threshold_km },
                Some(SanityFailure::CountRatioOutOfRange { ratio, max_ratio }) => ValidationError::SanityCount { ratio, max_ratio },
                None => unreachable!("sanity.passed is false implies a failure is set"),
            };
            return Ok(ValidationResult { valid: false, achieved_tier: Tier::Sanity, failure: Some(failure), warning: None, sanity: Some(sanity), tessellation: None });
        }

        if tier == Tier::Sanity {
            return Ok(ValidationResult { valid: true, achieved_tier: Tier::Sanity, failure: None, warning: None, sanity: Some(sanity), tessellation: None });
        }

        let warning = expected.is_none().then(|| "no registered expected count; cardinality checked against actual feature count".to_string());
        let inputs = TessellationInputs {
            districts: &features.features,
            municipal: &municipal.polygon,
            expected_count,
            authoritative_land_area: Some(municipal.land_area),
            authoritative_union_area: None,
            water_area: municipal.water_area,
            fips: Some(effective_fips.as_str()),
        };
        let proof = prove_tessellation(&inputs, &self.tessellation_exceptions);
        if !proof.valid {
            let failure = match &proof.failure {
                Some(AxiomFailure::Cardinality { actual, expected }) => ValidationError::AxiomCardinality { actual: *actual, expected: *expected },
                Some(AxiomFailure::Exclusivity { total_overlap, .. }) => ValidationError::AxiomExclusivity { total_overlap: *total_overlap },
                Some(AxiomFailure::Containment { outside_ratio, .. }) => ValidationError::AxiomContainment { outside_ratio: *outside_ratio },
                Some(AxiomFailure::Exhaustivity { coverage, .. }) => ValidationError::AxiomExhaustivity { coverage: *coverage },
                None => unreachable!("proof.valid is false implies a failure is set"),
            };
            return Ok(ValidationResult { valid: false, achieved_tier: Tier::Full, failure: Some(failure), warning, sanity: Some(sanity), tessellation: Some(proof) });
        }

        Ok(ValidationResult { valid: true, achieved_tier: Tier::Full, failure: None, warning, sanity: Some(sanity), tessellation: Some(proof) })
    }

    /// Validate many candidates with bounded concurrency.
    pub async fn validate_batch(
        self: Arc<Self>,
        candidates: Vec<(Fips, String)>,
        tier: Tier,
        concurrency: usize,
    ) -> Vec<(Fips, Result<ValidationResult, IngestionError>)>
    where
        F: 'static,
        M: 'static,
    {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut set = tokio::task::JoinSet::new();
        for (fips, url) in candidates {
            let validator = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                let result = validator.validate(&fips, &url, tier).await;
                (fips, result)
            });
        }
        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            if let Ok(pair) = joined {
                results.push(pair);
            }
        }
        results
    }
}

fn mbr_error_message(e: MbrError) -> String {
    e.to_string()
}

fn combine(features: &[MultiPolygon]) -> MultiPolygon {
    MultiPolygon::new(features.iter().flat_map(|f| f.polygons.clone()).collect())
}
