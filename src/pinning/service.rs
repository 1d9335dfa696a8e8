//! The abstract pin/verify/unpin contract every pinning backend implements,
//! plus an HTTP-generic implementation and an environment-driven factory.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

/// Which concrete content-addressed storage backend a service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinningBackend {
    /// storacha.network
    Storacha,
    /// pinata.cloud
    Pinata,
    /// fleek.co
    Fleek,
    /// web3.storage
    Web3Storage,
}

impl PinningBackend {
    /// Every backend, for iterating the factory's env-var checks.
    pub const ALL: [PinningBackend; 4] =
        [PinningBackend::Storacha, PinningBackend::Pinata, PinningBackend::Fleek, PinningBackend::Web3Storage];

    /// Name of the environment variable carrying this backend's API token.
    pub fn env_var(self) -> &'static str {
        match self {
            PinningBackend::Storacha => "STORACHA_API_TOKEN",
            PinningBackend::Pinata => "PINATA_API_TOKEN",
            PinningBackend::Fleek => "FLEEK_API_TOKEN",
            PinningBackend::Web3Storage => "WEB3STORAGE_API_TOKEN",
        }
    }

    fn default_api_base(self) -> &'static str {
        match self {
            PinningBackend::Storacha => "https://up.storacha.network/api",
            PinningBackend::Pinata => "https://api.pinata.cloud",
            PinningBackend::Fleek => "https://api.fleek.co/pinning",
            PinningBackend::Web3Storage => "https://api.web3.storage",
        }
    }

    fn gateway_template(self) -> &'static str {
        match self {
            PinningBackend::Storacha => "https://{cid}.ipfs.storacha.link",
            PinningBackend::Pinata => "https://gateway.pinata.cloud/ipfs/{cid}",
            PinningBackend::Fleek => "https://ipfs.fleek.co/ipfs/{cid}",
            PinningBackend::Web3Storage => "https://{cid}.ipfs.w3s.link",
        }
    }
}

/// Options accompanying a pin request.
#[derive(Debug, Clone, Default)]
pub struct PinOptions {
    /// Human-readable label for the pinned content, when the backend
    /// supports one.
    pub name: Option<String>,
}

/// Outcome of a single pin attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PinOutcome {
    /// Whether the pin succeeded.
    pub success: bool,
    /// The content identifier assigned, when successful.
    pub cid: Option<String>,
    /// Size in bytes of the pinned blob, when reported.
    pub size: Option<u64>,
    /// How long the call took.
    pub duration: Duration,
    /// Error detail, when unsuccessful.
    pub error: Option<String>,
}

/// Closed error taxonomy for pinning-service operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PinningError {
    /// The gateway/backend did not respond successfully.
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),
    /// The cid is not recognized by this backend.
    #[error("invalid cid")]
    InvalidCid,
    /// The backend's rate limit was exceeded.
    #[error("quota exceeded")]
    QuotaExceeded,
}

/// The abstract pin/verify/unpin/health/gateway-url contract every backend
/// implements, so the Regional Service and Update Coordinator never depend
/// on a concrete wire protocol.
#[async_trait]
pub trait PinningService: Send + Sync {
    /// Which backend this instance talks to.
    fn backend(&self) -> PinningBackend;

    /// Pin `blob`, returning the outcome (never an `Err`: failures are
    /// reported in [`PinOutcome::success`]/`error` so callers fanning out
    /// across many services can collect every result uniformly).
    async fn pin(&self, blob: &[u8], options: &PinOptions) -> PinOutcome;

    /// Whether `cid` is currently pinned by this service.
    async fn verify(&self, cid: &str) -> Result<bool, PinningError>;

    /// Unpin `cid`.
    async fn unpin(&self, cid: &str) -> Result<(), PinningError>;

    /// Lightweight liveness probe.
    async fn health_check(&self) -> bool;

    /// A public gateway URL resolving `cid` to content.
    fn gateway_url(&self, cid: &str) -> String;
}

/// HTTP-generic [`PinningService`] implementation shared by every backend;
/// each backend differs only in its API base URL, bearer token, and public
/// gateway URL template.
pub struct HttpPinningService {
    backend: PinningBackend,
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl HttpPinningService {
    /// Construct a service for `backend`, authenticating with `token`.
    pub fn new(backend: PinningBackend, client: reqwest::Client, token: impl Into<String>) -> Self {
        Self { backend, client, api_base: backend.default_api_base().to_string(), token: token.into() }
    }

    /// Override the default API base URL (useful for self-hosted gateways
    /// or test doubles).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[derive(serde::Deserialize)]
struct PinResponse {
    cid: String,
    size: Option<u64>,
}

#[async_trait]
impl PinningService for HttpPinningService {
    fn backend(&self) -> PinningBackend {
        self.backend
    }

    async fn pin(&self, blob: &[u8], options: &PinOptions) -> PinOutcome {
        let started = Instant::now();
        let mut request = self
            .client
            .post(format!("{}/pins", self.api_base))
            .bearer_auth(&self.token)
            .body(blob.to_vec());
        if let Some(name) = &options.name {
            request = request.query(&[("name", name)]);
        }
        let result = request.send().await;
        let duration = started.elapsed();
        match result {
            Ok(response) if response.status().is_success() => match response.json::<PinResponse>().await {
                Ok(parsed) => PinOutcome { success: true, cid: Some(parsed.cid), size: parsed.size, duration, error: None },
                Err(e) => PinOutcome { success: false, cid: None, size: None, duration, error: Some(e.to_string()) },
            },
            Ok(response) => {
                PinOutcome { success: false, cid: None, size: None, duration, error: Some(format!("HTTP {}", response.status())) }
            }
            Err(e) => PinOutcome { success: false, cid: None, size: None, duration, error: Some(e.to_string()) },
        }
    }

    async fn verify(&self, cid: &str) -> Result<bool, PinningError> {
        let response = self
            .client
            .get(format!("{}/pins/{cid}", self.api_base))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PinningError::GatewayUnavailable(e.to_string()))?;
        match response.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            429 => Err(PinningError::QuotaExceeded),
            _ => Err(PinningError::GatewayUnavailable(format!("HTTP {}", response.status()))),
        }
    }

    async fn unpin(&self, cid: &str) -> Result<(), PinningError> {
        let response = self
            .client
            .delete(format!("{}/pins/{cid}", self.api_base))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PinningError::GatewayUnavailable(e.to_string()))?;
        match response.status().as_u16() {
            200 | 202 | 204 => Ok(()),
            404 => Err(PinningError::InvalidCid),
            429 => Err(PinningError::QuotaExceeded),
            _ => Err(PinningError::GatewayUnavailable(format!("HTTP {}", response.status()))),
        }
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/health", self.api_base))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn gateway_url(&self, cid: &str) -> String {
        self.backend.gateway_template().replace("{cid}", cid)
    }
}

/// Builds the set of available [`PinningService`] backends from whichever
/// API tokens are present in the environment, logging a warning (rather
/// than failing) for each missing credential so a partial deployment still
/// starts.
pub struct PinningServiceFactory;

impl PinningServiceFactory {
    /// Construct every backend whose credential env var is set.
    pub fn from_env(client: reqwest::Client) -> Vec<Arc<dyn PinningService>> {
        let mut services: Vec<Arc<dyn PinningService>> = Vec::new();
        for backend in PinningBackend::ALL {
            match std::env::var(backend.env_var()) {
                Ok(token) if !token.is_empty() => {
                    services.push(Arc::new(HttpPinningService::new(backend, client.clone(), token)));
                }
                _ => {
                    tracing::warn!(backend = ?backend, env_var = backend.env_var(), "pinning backend credential not set, skipping");
                }
            }
        }
        services
    }
}

/// Deterministic in-memory [`PinningService`] for tests: returns a fixed cid
/// (content-hash-derived) and tracks pin/unpin calls without any network.
pub struct FixturePinningService {
    backend: PinningBackend,
    should_fail: bool,
    cid_override: Option<String>,
    pinned: parking_lot::Mutex<HashMap<String, Vec<u8>>>,
}

impl FixturePinningService {
    /// Construct a fixture that succeeds, deriving its cid from the blob's
    /// content hash (so identical content always yields the same cid,
    /// matching the CID-equality invariant).
    pub fn succeeding(backend: PinningBackend) -> Self {
        Self { backend, should_fail: false, cid_override: None, pinned: parking_lot::Mutex::new(HashMap::new()) }
    }

    /// Construct a fixture that always fails its pin calls.
    pub fn failing(backend: PinningBackend) -> Self {
        Self { backend, should_fail: true, cid_override: None, pinned: parking_lot::Mutex::new(HashMap::new()) }
    }

    /// Force a specific (possibly wrong) cid, for exercising the CID-
    /// equality-violation path in tests.
    pub fn with_cid_override(mut self, cid: impl Into<String>) -> Self {
        self.cid_override = Some(cid.into());
        self
    }
}

#[async_trait]
impl PinningService for FixturePinningService {
    fn backend(&self) -> PinningBackend {
        self.backend
    }

    async fn pin(&self, blob: &[u8], _options: &PinOptions) -> PinOutcome {
        if self.should_fail {
            return PinOutcome { success: false, cid: None, size: None, duration: Duration::from_millis(1), error: Some("fixture configured to fail".to_string()) };
        }
        let cid = self.cid_override.clone().unwrap_or_else(|| format!("bafy-{:x}", crc32(blob)));
        self.pinned.lock().insert(cid.clone(), blob.to_vec());
        PinOutcome { success: true, cid: Some(cid), size: Some(blob.len() as u64), duration: Duration::from_millis(1), error: None }
    }

    async fn verify(&self, cid: &str) -> Result<bool, PinningError> {
        Ok(self.pinned.lock().contains_key(cid))
    }

    async fn unpin(&self, cid: &str) -> Result<(), PinningError> {
        self.pinned.lock().remove(cid);
        Ok(())
    }

    async fn health_check(&self) -> bool {
        !self.should_fail
    }

    fn gateway_url(&self, cid: &str) -> String {
        self.backend.gateway_template().replace("{cid}", cid)
    }
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn succeeding_fixture_pins_content_addressed_by_its_bytes() {
        let service = FixturePinningService::succeeding(PinningBackend::Storacha);
        let outcome_a = service.pin(b"hello", &PinOptions::default()).await;
        let outcome_b = service.pin(b"hello", &PinOptions::default()).await;
        assert!(outcome_a.success && outcome_b.success);
        assert_eq!(outcome_a.cid, outcome_b.cid);
    }

    #[tokio::test]
    async fn failing_fixture_never_succeeds() {
        let service = FixturePinningService::failing(PinningBackend::Pinata);
        let outcome = service.pin(b"hello", &PinOptions::default()).await;
        assert!(!outcome.success);
        assert!(outcome.cid.is_none());
    }

    #[tokio::test]
    async fn verify_reflects_prior_pin_state() {
        let service = FixturePinningService::succeeding(PinningBackend::Fleek);
        let outcome = service.pin(b"hello", &PinOptions::default()).await;
        let cid = outcome.cid.unwrap();
        assert!(service.verify(&cid).await.unwrap());
        service.unpin(&cid).await.unwrap();
        assert!(!service.verify(&cid).await.unwrap());
    }

    #[test]
    fn from_env_skips_backends_with_no_credential() {
        for backend in PinningBackend::ALL {
            std::env::remove_var(backend.env_var());
        }
        let services = PinningServiceFactory::from_env(reqwest::Client::new());
        assert!(services.is_empty());
    }
}
