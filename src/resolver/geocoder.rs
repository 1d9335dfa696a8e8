//! Geocoder seam: address text to `{lat, lng, confidence, match_type}`.

use async_trait::async_trait;
use thiserror::Error;

/// Result of geocoding a free-text address.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
    /// Confidence score, 0-100.
    pub confidence: u8,
    /// Provider-reported match precision (e.g. `"rooftop"`, `"street"`).
    pub match_type: String,
}

/// Error surface for geocoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeocoderError {
    /// The provider returned no match for the address.
    #[error("no geocode match for address")]
    NoMatch,
    /// The underlying request failed (network, timeout, non-2xx).
    #[error("geocoder request failed: {0}")]
    RequestFailed(String),
}

/// Address-to-coordinate resolution.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Geocode a free-text address.
    async fn geocode(&self, address: &str) -> Result<GeocodeResult, GeocoderError>;
}

/// Fixed in-memory [`Geocoder`] for tests and fixtures.
#[derive(Debug, Clone, Default)]
pub struct FixtureGeocoder {
    entries: std::collections::HashMap<String, GeocodeResult>,
}

impl FixtureGeocoder {
    /// Construct an empty fixture geocoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a canned result for an address (matched after the same
    /// normalization the resolver cache applies).
    pub fn insert(&mut self, address: impl Into<String>, result: GeocodeResult) {
        self.entries.insert(address.into(), result);
    }
}

#[async_trait]
impl Geocoder for FixtureGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeocodeResult, GeocoderError> {
        self.entries.get(address).cloned().ok_or(GeocoderError::NoMatch)
    }
}

/// HTTP-backed [`Geocoder`] calling a configured endpoint. The concrete
/// geocoding provider is an external collaborator with its own wire
/// protocol; this implementation assumes a simple JSON response shape and
/// exists to show the seam's shape for a production deployment.
pub struct HttpGeocoder {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpGeocoder {
    /// Build a geocoder posting to `endpoint` with an existing client.
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { client, endpoint: endpoint.into() }
    }
}

#[derive(serde::Deserialize)]
struct RawGeocodeResponse {
    lat: f64,
    lng: f64,
    confidence: u8,
    match_type: String,
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeocodeResult, GeocoderError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("address", address)])
            .send()
            .await
            .map_err(|e| GeocoderError::RequestFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(GeocoderError::RequestFailed(format!("HTTP {}", response.status())));
        }
        let raw: RawGeocodeResponse = response.json().await.map_err(|e| GeocoderError::RequestFailed(e.to_string()))?;
        Ok(GeocodeResult { lat: raw.lat, lng: raw.lng, confidence: raw.confidence, match_type: raw.match_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_geocoder_resolves_registered_addresses() {
        let mut geocoder = FixtureGeocoder::new();
        geocoder.insert("123 main st", GeocodeResult { lat: 43.07, lng: -89.4, confidence: 95, match_type: "rooftop".to_string() });
        let result = geocoder.geocode("123 main st").await.unwrap();
        assert_eq!(result.confidence, 95);
    }

    #[tokio::test]
    async fn fixture_geocoder_reports_no_match() {
        let geocoder = FixtureGeocoder::new();
        let result = geocoder.geocode("nowhere").await;
        assert_eq!(result, Err(GeocoderError::NoMatch));
    }
}
