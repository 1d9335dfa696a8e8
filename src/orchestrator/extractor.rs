//! HTTP-backed [`Extractor`]: fetches one state/layer's feature collection
//! from a templated endpoint, reusing the same [`FeatureSource`] seam the
//! Ingestion Validator fetches candidates through.

use std::time::Duration;

use async_trait::async_trait;

use crate::ids::LayerType;
use crate::ingestion::{FeatureSource, FetchError, HttpFeatureSource};

use super::engine::{ExtractError, ExtractOutcome, Extractor};

/// Configuration for [`HttpExtractor`].
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// URL template; `{state}` and `{layer}` are substituted.
    pub url_template: String,
}

impl ExtractorConfig {
    /// Build from environment variables, falling back to a placeholder
    /// template and a 30s timeout.
    ///
    /// - `ORCHESTRATOR_FETCH_TIMEOUT_SECS` (default 30)
    /// - `ORCHESTRATOR_URL_TEMPLATE` (default a Census TIGERweb-shaped
    ///   placeholder)
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("ORCHESTRATOR_FETCH_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()).unwrap_or(30);
        let url_template = std::env::var("ORCHESTRATOR_URL_TEMPLATE").unwrap_or_else(|_| {
            tracing::warn!("ORCHESTRATOR_URL_TEMPLATE not set, using placeholder template");
            "https://tigerweb.geo.census.gov/state/{state}/{layer}.geojson".to_string()
        });
        Self { timeout: Duration::from_secs(timeout_secs), url_template }
    }
}

/// Extracts a state/layer's feature collection over HTTP.
pub struct HttpExtractor<F = HttpFeatureSource> {
    feature_source: F,
    config: ExtractorConfig,
}

impl HttpExtractor<HttpFeatureSource> {
    /// Build an extractor over a fresh [`reqwest::Client`] and `config`.
    pub fn new(client: reqwest::Client, config: ExtractorConfig) -> Self {
        Self { feature_source: HttpFeatureSource::new(client), config }
    }
}

impl<F: FeatureSource> HttpExtractor<F> {
    /// Build an extractor over an arbitrary [`FeatureSource`], for tests.
    pub fn with_source(feature_source: F, config: ExtractorConfig) -> Self {
        Self { feature_source, config }
    }

    fn url_for(&self, state: &str, layer: LayerType) -> String {
        self.config.url_template.replace("{state}", state).replace("{layer}", &layer.to_string())
    }
}

#[async_trait]
impl<F: FeatureSource> Extractor for HttpExtractor<F> {
    async fn extract(&self, state: &str, layer: LayerType) -> Result<ExtractOutcome, ExtractError> {
        let url = self.url_for(state, layer);
        match self.feature_source.fetch(&url, self.config.timeout).await {
            Ok(collection) => Ok(ExtractOutcome { actual_count: collection.features.len() }),
            Err(FetchError::NetworkTimeout) => Err(ExtractError::NetworkTimeout),
            Err(FetchError::HttpError { status }) => Err(ExtractError::HttpError { status }),
            Err(FetchError::InvalidPayload(_)) => Err(ExtractError::InvalidPayload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::{FeatureCollection, FixtureFeatureSource};

    fn config() -> ExtractorConfig {
        ExtractorConfig { timeout: Duration::from_secs(5), url_template: "fixture://{state}/{layer}".to_string() }
    }

    #[tokio::test]
    async fn extracts_feature_count_from_the_templated_url() {
        let mut source = FixtureFeatureSource::new();
        source.insert(
            "fixture://WI/county",
            FeatureCollection { features: vec![crate::geometry::MultiPolygon { polygons: vec![] }; 3] },
        );
        let extractor = HttpExtractor::with_source(source, config());
        let outcome = extractor.extract("WI", LayerType::County).await.unwrap();
        assert_eq!(outcome.actual_count, 3);
    }

    #[tokio::test]
    async fn missing_document_maps_to_http_error() {
        let source = FixtureFeatureSource::new();
        let extractor = HttpExtractor::with_source(source, config());
        let err = extractor.extract("WI", LayerType::County).await.unwrap_err();
        assert_eq!(err, ExtractError::HttpError { status: 404 });
    }
}
