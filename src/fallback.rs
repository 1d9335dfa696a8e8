//! Fallback Resolver: resolves a cid to bytes through a primary region
//! gateway, falling back across an ordered gateway chain with response and
//! failure caching and exponential backoff.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use thiserror::Error;

use crate::availability::GatewayHealthView;

/// Default TTL for cached successful resolutions.
pub const DEFAULT_RESPONSE_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
/// Default TTL for cached failures (short, so a transient outage is retried
/// soon, but a hot-looping caller doesn't hammer a dead gateway).
pub const DEFAULT_FAILURE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
/// Default base delay for the exponential backoff between gateway attempts.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(200);
/// Small fixed tail of public gateways tried after every regional gateway is
/// exhausted.
pub const PUBLIC_GATEWAY_TAIL: &[&str] = &["https://ipfs.io/ipfs", "https://dweb.link/ipfs", "https://cf-ipfs.com/ipfs"];

/// Closed error taxonomy for a single gateway attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayFetchError {
    /// The gateway reports the cid does not exist (HTTP 404): not
    /// retryable against the same gateway.
    #[error("invalid cid")]
    InvalidCid,
    /// The gateway rate-limited this request (HTTP 429): retryable after
    /// backoff.
    #[error("quota exceeded")]
    QuotaExceeded,
    /// The request exceeded its deadline.
    #[error("network timeout")]
    NetworkTimeout,
    /// The gateway is unreachable or returned a server error.
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),
}

impl GatewayFetchError {
    /// Whether retrying this same cid against a *different* gateway is
    /// worth attempting.
    pub fn retryable(&self) -> bool {
        !matches!(self, GatewayFetchError::InvalidCid)
    }
}

/// Criteria narrowing which gateways a resolution attempt should prefer.
#[derive(Debug, Clone, Default)]
pub struct ResolveCriteria {
    /// Prefer gateways serving this region first.
    pub preferred_region: Option<String>,
}

/// Outcome of resolving a cid through the fallback chain.
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    /// Whether any gateway in the chain served the content.
    pub success: bool,
    /// The gateway that ultimately served it, if successful.
    pub gateway: Option<String>,
    /// The region the successful gateway belongs to, if known.
    pub region: Option<String>,
    /// Number of gateway attempts made.
    pub attempts: u32,
    /// Per-gateway errors encountered along the way.
    pub errors: Vec<(String, GatewayFetchError)>,
    /// Total wall-clock time spent resolving.
    pub duration: Duration,
    /// The resolved bytes, if successful.
    pub bytes: Option<Vec<u8>>,
}

/// Fetches a cid's content from a named gateway; the network/transport seam
/// the resolver is generic over, mirroring how [`crate::mbr::MunicipalSource`]
/// separates fetch logic from caching and fallback policy.
#[async_trait]
pub trait GatewayFetcher: Send + Sync {
    /// Fetch `cid` from `gateway` (a base URL such as `https://ipfs.io/ipfs`).
    async fn fetch(&self, gateway: &str, cid: &str) -> Result<Vec<u8>, GatewayFetchError>;
}

/// [`GatewayFetcher`] backed by a real HTTP client.
pub struct HttpGatewayFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpGatewayFetcher {
    /// Construct a fetcher with the given per-request timeout.
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl GatewayFetcher for HttpGatewayFetcher {
    async fn fetch(&self, gateway: &str, cid: &str) -> Result<Vec<u8>, GatewayFetchError> {
        let url = format!("{gateway}/{cid}");
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { GatewayFetchError::NetworkTimeout } else { GatewayFetchError::GatewayUnavailable(e.to_string()) })?;
        match response.status().as_u16() {
            200 => response.bytes().await.map(|b| b.to_vec()).map_err(|e| GatewayFetchError::GatewayUnavailable(e.to_string())),
            404 => Err(GatewayFetchError::InvalidCid),
            429 => Err(GatewayFetchError::QuotaExceeded),
            status => Err(GatewayFetchError::GatewayUnavailable(format!("HTTP {status}"))),
        }
    }
}

struct CachedResponse {
    bytes: Vec<u8>,
    gateway: String,
    region: Option<String>,
    inserted_at: Instant,
}

struct CachedFailure {
    error: GatewayFetchError,
    inserted_at: Instant,
}

/// Resolves a cid to bytes via an ordered gateway chain (preferred region's
/// gateways, then a fixed public-gateway tail), with response/failure
/// caching and exponential backoff between attempts.
pub struct FallbackResolver<F: GatewayFetcher> {
    fetcher: F,
    health: GatewayHealthView,
    region_gateways: HashMap<String, Vec<String>>,
    response_cache: Mutex<LruCache<String, CachedResponse>>,
    failure_cache: Mutex<LruCache<String, CachedFailure>>,
    response_ttl: Duration,
    failure_ttl: Duration,
    backoff_base: Duration,
}

impl<F: GatewayFetcher> FallbackResolver<F> {
    /// Construct a resolver over `fetcher`, reading gateway health through
    /// `health`, with a statically known `region -> gateway list` table.
    pub fn new(fetcher: F, health: GatewayHealthView, region_gateways: HashMap<String, Vec<String>>) -> Self {
        Self {
            fetcher,
            health,
            region_gateways,
            response_cache: Mutex::new(LruCache::new(NonZeroUsize::new(4096).unwrap())),
            failure_cache: Mutex::new(LruCache::new(NonZeroUsize::new(4096).unwrap())),
            response_ttl: DEFAULT_RESPONSE_CACHE_TTL,
            failure_ttl: DEFAULT_FAILURE_CACHE_TTL,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    /// Override the default backoff base delay (test hook).
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// The ordered gateway candidate list for `criteria`: the preferred
    /// region's available (circuit-closed) gateways first, then every other
    /// region's available gateways, then the public tail, with duplicates
    /// removed.
    fn select_gateway_chain(&self, criteria: &ResolveCriteria) -> Vec<(String, Option<String>)> {
        let mut chain: Vec<(String, Option<String>)> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        let mut regions: Vec<&String> = self.region_gateways.keys().collect();
        if let Some(preferred) = &criteria.preferred_region {
            regions.sort_by_key(|r| if *r == preferred { 0 } else { 1 });
        }

        for region in regions {
            let available = self.health.available_in_region(region);
            let gateways = &self.region_gateways[region];
            let mut ordered: Vec<&String> = gateways.iter().filter(|g| available.contains(g)).collect();
            ordered.extend(gateways.iter().filter(|g| !available.contains(g)));
            for gateway in ordered {
                if seen.insert(gateway.clone()) {
                    chain.push((gateway.clone(), Some(region.clone())));
                }
            }
        }

        for gateway in PUBLIC_GATEWAY_TAIL {
            if seen.insert(gateway.to_string()) {
                chain.push((gateway.to_string(), None));
            }
        }

        chain
    }

    /// Resolve `cid`, trying the gateway chain in order until one succeeds
    /// or every gateway has been tried.
    pub async fn resolve(&self, cid: &str, criteria: &ResolveCriteria) -> ResolveOutcome {
        let started = Instant::now();

        if let Some(cached) = self.cached_response(cid) {
            return ResolveOutcome {
                success: true,
                gateway: Some(cached.gateway),
                region: cached.region,
                attempts: 0,
                errors: Vec::new(),
                duration: started.elapsed(),
                bytes: Some(cached.bytes),
            };
        }

        if let Some(failure) = self.cached_failure(cid) {
            if !failure.error.retryable() {
                return ResolveOutcome {
                    success: false,
                    gateway: None,
                    region: None,
                    attempts: 0,
                    errors: vec![("cached".to_string(), failure.error)],
                    duration: started.elapsed(),
                    bytes: None,
                };
            }
        }

        let chain = self.select_gateway_chain(criteria);
        let mut errors = Vec::new();
        let mut attempts: u32 = 0;

        for (gateway, region) in &chain {
            if attempts > 0 {
                let delay = self.backoff_base * 2u32.pow(attempts.saturating_sub(1));
                tokio::time::sleep(delay).await;
            }
            attempts += 1;

            let attempt_started = Instant::now();
            match self.fetcher.fetch(gateway, cid).await {
                Ok(bytes) => {
                    self.health.record_request(gateway, true, attempt_started.elapsed());
                    self.cache_response(cid, gateway.clone(), region.clone(), bytes.clone());
                    return ResolveOutcome {
                        success: true,
                        gateway: Some(gateway.clone()),
                        region: region.clone(),
                        attempts,
                        errors,
                        duration: started.elapsed(),
                        bytes: Some(bytes),
                    };
                }
                Err(error) => {
                    self.health.record_request(gateway, false, attempt_started.elapsed());
                    let retryable = error.retryable();
                    errors.push((gateway.clone(), error.clone()));
                    self.cache_failure(cid, error);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        ResolveOutcome { success: false, gateway: None, region: None, attempts, errors, duration: started.elapsed(), bytes: None }
    }

    fn cached_response(&self, cid: &str) -> Option<CachedResponseSnapshot> {
        let mut cache = self.response_cache.lock();
        let expired = match cache.peek(cid) {
            Some(entry) => entry.inserted_at.elapsed() > self.response_ttl,
            None => return None,
        };
        if expired {
            cache.pop(cid);
            return None;
        }
        cache.get(cid).map(|entry| CachedResponseSnapshot { bytes: entry.bytes.clone(), gateway: entry.gateway.clone(), region: entry.region.clone() })
    }

    fn cache_response(&self, cid: &str, gateway: String, region: Option<String>, bytes: Vec<u8>) {
        self.response_cache.lock().put(cid.to_string(), CachedResponse { bytes, gateway, region, inserted_at: Instant::now() });
    }

    fn cached_failure(&self, cid: &str) -> Option<CachedFailureSnapshot> {
        let mut cache = self.failure_cache.lock();
        let expired = match cache.peek(cid) {
            Some(entry) => entry.inserted_at.elapsed() > self.failure_ttl,
            None => return None,
        };
        if expired {
            cache.pop(cid);
            return None;
        }
        cache.get(cid).map(|entry| CachedFailureSnapshot { error: entry.error.clone() })
    }

    fn cache_failure(&self, cid: &str, error: GatewayFetchError) {
        self.failure_cache.lock().put(cid.to_string(), CachedFailure { error, inserted_at: Instant::now() });
    }
}

struct CachedResponseSnapshot {
    bytes: Vec<u8>,
    gateway: String,
    region: Option<String>,
}

struct CachedFailureSnapshot {
    error: GatewayFetchError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::AvailabilityMonitor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedFetcher {
        scripts: HashMap<String, Vec<Result<Vec<u8>, GatewayFetchError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(scripts: HashMap<String, Vec<Result<Vec<u8>, GatewayFetchError>>>) -> Self {
            Self { scripts, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl GatewayFetcher for ScriptedFetcher {
        async fn fetch(&self, gateway: &str, _cid: &str) -> Result<Vec<u8>, GatewayFetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.scripts.get(gateway) {
                Some(results) if !results.is_empty() => results[0].clone(),
                _ => Err(GatewayFetchError::GatewayUnavailable("unscripted".to_string())),
            }
        }
    }

    fn one_region() -> HashMap<String, Vec<String>> {
        let mut map = HashMap::new();
        map.insert("us-east".to_string(), vec!["gw-primary".to_string(), "gw-secondary".to_string()]);
        map
    }

    #[tokio::test]
    async fn resolves_via_primary_gateway_on_first_try() {
        let monitor = AvailabilityMonitor::new();
        monitor.register_gateway("gw-primary", "us-east");
        let mut scripts = HashMap::new();
        scripts.insert("gw-primary".to_string(), vec![Ok(b"content".to_vec())]);
        let resolver = FallbackResolver::new(ScriptedFetcher::new(scripts), monitor.view(), one_region());
        let outcome = resolver.resolve("cid-1", &ResolveCriteria::default()).await;
        assert!(outcome.success);
        assert_eq!(outcome.gateway.as_deref(), Some("gw-primary"));
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn falls_back_to_secondary_gateway_after_primary_fails() {
        let monitor = AvailabilityMonitor::new();
        monitor.register_gateway("gw-primary", "us-east");
        monitor.register_gateway("gw-secondary", "us-east");
        let mut scripts = HashMap::new();
        scripts.insert("gw-primary".to_string(), vec![Err(GatewayFetchError::NetworkTimeout)]);
        scripts.insert("gw-secondary".to_string(), vec![Ok(b"content".to_vec())]);
        let resolver =
            FallbackResolver::new(ScriptedFetcher::new(scripts), monitor.view(), one_region()).with_backoff_base(Duration::from_millis(1));
        let outcome = resolver.resolve("cid-1", &ResolveCriteria::default()).await;
        assert!(outcome.success);
        assert_eq!(outcome.gateway.as_deref(), Some("gw-secondary"));
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn invalid_cid_does_not_retry_against_other_gateways() {
        let monitor = AvailabilityMonitor::new();
        monitor.register_gateway("gw-primary", "us-east");
        monitor.register_gateway("gw-secondary", "us-east");
        let mut scripts = HashMap::new();
        scripts.insert("gw-primary".to_string(), vec![Err(GatewayFetchError::InvalidCid)]);
        scripts.insert("gw-secondary".to_string(), vec![Ok(b"content".to_vec())]);
        let resolver =
            FallbackResolver::new(ScriptedFetcher::new(scripts), monitor.view(), one_region()).with_backoff_base(Duration::from_millis(1));
        let outcome = resolver.resolve("cid-1", &ResolveCriteria::default()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn successful_resolution_is_cached_and_skips_future_fetches() {
        let monitor = AvailabilityMonitor::new();
        monitor.register_gateway("gw-primary", "us-east");
        let mut scripts = HashMap::new();
        scripts.insert("gw-primary".to_string(), vec![Ok(b"content".to_vec())]);
        let resolver = FallbackResolver::new(ScriptedFetcher::new(scripts), monitor.view(), one_region());
        let first = resolver.resolve("cid-1", &ResolveCriteria::default()).await;
        let second = resolver.resolve("cid-1", &ResolveCriteria::default()).await;
        assert!(first.success && second.success);
        assert_eq!(second.attempts, 0);
    }

    #[tokio::test]
    async fn exhausting_every_gateway_reports_failure_with_all_errors() {
        let monitor = AvailabilityMonitor::new();
        monitor.register_gateway("gw-primary", "us-east");
        monitor.register_gateway("gw-secondary", "us-east");
        let mut scripts = HashMap::new();
        scripts.insert("gw-primary".to_string(), vec![Err(GatewayFetchError::NetworkTimeout)]);
        scripts.insert("gw-secondary".to_string(), vec![Err(GatewayFetchError::NetworkTimeout)]);
        let resolver =
            FallbackResolver::new(ScriptedFetcher::new(scripts), monitor.view(), one_region()).with_backoff_base(Duration::from_millis(1));
        let outcome = resolver.resolve("cid-1", &ResolveCriteria::default()).await;
        assert!(!outcome.success);
        assert!(outcome.attempts >= 2);
        assert!(!outcome.errors.is_empty());
    }
}
