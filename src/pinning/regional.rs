//! Region-scoped fan-out over several [`PinningService`] backends, enforcing
//! that every backend which successfully pins a blob agrees on its cid.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;

use super::service::{PinOptions, PinningBackend, PinningService};

/// Outcome of fanning a pin out across one region's backends.
#[derive(Debug, Clone)]
pub struct RegionPinOutcome {
    /// Whether enough backends succeeded, all agreeing on the cid.
    pub success: bool,
    /// The agreed-upon cid, when successful.
    pub cid: Option<String>,
    /// Backends that pinned successfully.
    pub succeeded: Vec<PinningBackend>,
    /// Backends that failed, with their error text.
    pub failed: Vec<(PinningBackend, String)>,
    /// Total wall-clock time for the fan-out.
    pub duration: Duration,
}

/// A region's ordered set of pinning backends (priority order: first entry
/// is preferred for reads such as [`RegionalService::gateway_url`]).
pub struct RegionalService {
    region: String,
    services: Vec<Arc<dyn PinningService>>,
}

impl RegionalService {
    /// Construct a regional service over `services`, in priority order.
    pub fn new(region: impl Into<String>, services: Vec<Arc<dyn PinningService>>) -> Self {
        Self { region: region.into(), services }
    }

    /// This region's identifier.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The backends composing this region, in priority order.
    pub fn services(&self) -> &[Arc<dyn PinningService>] {
        &self.services
    }

    /// Pin `blob` to every backend in this region concurrently. Succeeds
    /// only if at least `required_successes` backends report success and
    /// every successful backend agrees on the resulting cid; a cid
    /// disagreement among successes is treated as a region-wide failure
    /// even if the success count would otherwise be enough, since a
    /// mismatched cid means replicas are not serving the same content.
    pub async fn pin_to_region(&self, blob: &[u8], options: &PinOptions, required_successes: usize) -> RegionPinOutcome {
        let started = Instant::now();
        let attempts = self.services.iter().map(|service| {
            let service = Arc::clone(service);
            let blob = blob.to_vec();
            let options = options.clone();
            async move {
                let outcome = service.pin(&blob, &options).await;
                (service.backend(), outcome)
            }
        });
        let results = join_all(attempts).await;
        let duration = started.elapsed();

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut cids: Vec<String> = Vec::new();
        for (backend, outcome) in results {
            if outcome.success {
                if let Some(cid) = outcome.cid {
                    cids.push(cid);
                }
                succeeded.push(backend);
            } else {
                failed.push((backend, outcome.error.unwrap_or_else(|| "unknown error".to_string())));
            }
        }

        let cid_agreement = cids.windows(2).all(|pair| pair[0] == pair[1]);
        let success = succeeded.len() >= required_successes && cid_agreement && !cids.is_empty();
        let cid = if success { cids.into_iter().next() } else { None };

        RegionPinOutcome { success, cid, succeeded, failed, duration }
    }

    /// True if any backend in this region reports `cid` pinned.
    pub async fn verify_pin(&self, cid: &str) -> bool {
        let checks = self.services.iter().map(|service| {
            let service = Arc::clone(service);
            let cid = cid.to_string();
            async move { service.verify(&cid).await.unwrap_or(false) }
        });
        join_all(checks).await.into_iter().any(|ok| ok)
    }

    /// Unpin `cid` from every backend in this region; individual failures
    /// are collected but do not short-circuit the sweep.
    pub async fn unpin_region(&self, cid: &str) -> Vec<(PinningBackend, Result<(), String>)> {
        let attempts = self.services.iter().map(|service| {
            let service = Arc::clone(service);
            let cid = cid.to_string();
            async move { (service.backend(), service.unpin(&cid).await.map_err(|e| e.to_string())) }
        });
        join_all(attempts).await
    }

    /// A gateway URL for `cid` from the highest-priority backend.
    pub fn gateway_url(&self, cid: &str) -> Option<String> {
        self.services.first().map(|service| service.gateway_url(cid))
    }
}
