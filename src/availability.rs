//! Availability Monitor: periodic gateway health polling, a circuit breaker
//! per gateway, and rolling success-rate/latency metrics exposed through a
//! narrow read-only view so downstream consumers (the Fallback Resolver)
//! never depend on the monitor's mutable internals.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

/// Default interval between health polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Default per-probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Consecutive failures before a gateway is pulled from rotation.
pub const CIRCUIT_BREAKER_THRESHOLD: u32 = 3;
/// Window size for rolling success-rate and latency percentiles.
pub const ROLLING_WINDOW: usize = 100;

/// A single health-probe result recorded for a gateway.
#[derive(Debug, Clone, Copy)]
struct Sample {
    success: bool,
    latency: Duration,
}

/// Per-gateway mutable health state.
struct GatewayState {
    region: String,
    consecutive_failures: u32,
    circuit_open: bool,
    samples: VecDeque<Sample>,
}

impl GatewayState {
    fn new(region: String) -> Self {
        Self { region, consecutive_failures: 0, circuit_open: false, samples: VecDeque::with_capacity(ROLLING_WINDOW) }
    }

    fn record(&mut self, success: bool, latency: Duration) {
        if self.samples.len() == ROLLING_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { success, latency });

        if success {
            self.consecutive_failures = 0;
            self.circuit_open = false;
        } else {
            self.consecutive_failures += 1;
            if self.consecutive_failures >= CIRCUIT_BREAKER_THRESHOLD {
                self.circuit_open = true;
            }
        }
    }

    fn success_rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 1.0;
        }
        let successes = self.samples.iter().filter(|s| s.success).count();
        successes as f64 / self.samples.len() as f64
    }

    fn percentile(&self, p: f64) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let mut latencies: Vec<Duration> = self.samples.iter().map(|s| s.latency).collect();
        latencies.sort();
        let rank = ((latencies.len() as f64 - 1.0) * p).round() as usize;
        latencies.get(rank).copied()
    }
}

/// Point-in-time snapshot of a gateway's health, returned by
/// [`GatewayHealthView`].
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayHealth {
    /// The gateway's identifier.
    pub gateway: String,
    /// Which region it serves.
    pub region: String,
    /// Whether the circuit breaker has tripped (gateway excluded from
    /// rotation).
    pub circuit_open: bool,
    /// Fraction of the last [`ROLLING_WINDOW`] samples that succeeded.
    pub success_rate: f64,
    /// Current consecutive-failure streak.
    pub consecutive_failures: u32,
    /// 50th percentile latency over the rolling window.
    pub p50: Option<Duration>,
    /// 95th percentile latency over the rolling window.
    pub p95: Option<Duration>,
    /// 99th percentile latency over the rolling window.
    pub p99: Option<Duration>,
}

/// Shared health table: one [`GatewayState`] per gateway identifier.
struct Registry {
    gateways: std::collections::HashMap<String, GatewayState>,
}

/// Owns gateway health state and accepts probe/request outcomes.
///
/// Downstream consumers that only need to *read* health or *record*
/// outcomes (never enumerate or mutate the registry directly) should depend
/// on [`GatewayHealthView`] instead of this type, to avoid a cyclic
/// dependency between the monitor and its consumers.
pub struct AvailabilityMonitor {
    registry: Arc<RwLock<Registry>>,
}

impl AvailabilityMonitor {
    /// Construct an empty monitor.
    pub fn new() -> Self {
        Self { registry: Arc::new(RwLock::new(Registry { gateways: std::collections::HashMap::new() })) }
    }

    /// Register a gateway (idempotent) so it appears in views even before
    /// its first probe.
    pub fn register_gateway(&self, gateway: impl Into<String>, region: impl Into<String>) {
        let gateway = gateway.into();
        let mut registry = self.registry.write();
        registry.gateways.entry(gateway).or_insert_with(|| GatewayState::new(region.into()));
    }

    /// Record the outcome of a request or probe against `gateway`.
    pub fn record_request(&self, gateway: &str, success: bool, latency: Duration) {
        let mut registry = self.registry.write();
        if let Some(state) = registry.gateways.get_mut(gateway) {
            state.record(success, latency);
        }
    }

    /// A read-only, cheaply cloneable view over this monitor's health table.
    pub fn view(&self) -> GatewayHealthView {
        GatewayHealthView { registry: Arc::clone(&self.registry) }
    }
}

impl Default for AvailabilityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Narrow, read-mostly capability over an [`AvailabilityMonitor`]: health
/// lookups and request recording, nothing else. This is the type the
/// Fallback Resolver and Update Coordinator depend on, so neither needs a
/// direct reference to the monitor (or to each other).
#[derive(Clone)]
pub struct GatewayHealthView {
    registry: Arc<RwLock<Registry>>,
}

impl GatewayHealthView {
    /// Current health snapshot for `gateway`, if known.
    pub fn health(&self, gateway: &str) -> Option<GatewayHealth> {
        let registry = self.registry.read();
        registry.gateways.get(gateway).map(|state| GatewayHealth {
            gateway: gateway.to_string(),
            region: state.region.clone(),
            circuit_open: state.circuit_open,
            success_rate: state.success_rate(),
            consecutive_failures: state.consecutive_failures,
            p50: state.percentile(0.50),
            p95: state.percentile(0.95),
            p99: state.percentile(0.99),
        })
    }

    /// Whether `gateway` is presently excluded from rotation by its circuit
    /// breaker. Unknown gateways are treated as available (not yet probed).
    pub fn is_available(&self, gateway: &str) -> bool {
        let registry = self.registry.read();
        registry.gateways.get(gateway).map(|state| !state.circuit_open).unwrap_or(true)
    }

    /// Every gateway currently in rotation for `region`, ordered by success
    /// rate descending.
    pub fn available_in_region(&self, region: &str) -> Vec<String> {
        let registry = self.registry.read();
        let mut gateways: Vec<(String, f64)> = registry
            .gateways
            .iter()
            .filter(|(_, state)| state.region == region && !state.circuit_open)
            .map(|(name, state)| (name.clone(), state.success_rate()))
            .collect();
        gateways.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        gateways.into_iter().map(|(name, _)| name).collect()
    }

    /// Record the outcome of a request against `gateway`, same as
    /// [`AvailabilityMonitor::record_request`].
    pub fn record_request(&self, gateway: &str, success: bool, latency: Duration) {
        let mut registry = self.registry.write();
        if let Some(state) = registry.gateways.get_mut(gateway) {
            state.record(success, latency);
        }
    }

    /// Global success rate across every known gateway's rolling window.
    pub fn global_success_rate(&self) -> f64 {
        let registry = self.registry.read();
        if registry.gateways.is_empty() {
            return 1.0;
        }
        let total: f64 = registry.gateways.values().map(|s| s.success_rate()).sum();
        total / registry.gateways.len() as f64
    }

    /// Whether the global success rate meets `sla` (e.g. `0.99` for three
    /// nines-adjacent availability).
    pub fn meets_sla(&self, sla: f64) -> bool {
        self.global_success_rate() >= sla
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_opens_after_threshold_consecutive_failures() {
        let monitor = AvailabilityMonitor::new();
        monitor.register_gateway("gw-1", "us-east");
        let view = monitor.view();
        assert!(view.is_available("gw-1"));
        for _ in 0..CIRCUIT_BREAKER_THRESHOLD {
            monitor.record_request("gw-1", false, Duration::from_millis(50));
        }
        assert!(!view.is_available("gw-1"));
    }

    #[test]
    fn a_success_resets_the_consecutive_failure_streak_and_closes_circuit() {
        let monitor = AvailabilityMonitor::new();
        monitor.register_gateway("gw-1", "us-east");
        monitor.record_request("gw-1", false, Duration::from_millis(50));
        monitor.record_request("gw-1", false, Duration::from_millis(50));
        monitor.record_request("gw-1", true, Duration::from_millis(50));
        monitor.record_request("gw-1", false, Duration::from_millis(50));
        monitor.record_request("gw-1", false, Duration::from_millis(50));
        let view = monitor.view();
        assert!(view.is_available("gw-1"));
    }

    #[test]
    fn rolling_window_reports_success_rate_and_percentiles() {
        let monitor = AvailabilityMonitor::new();
        monitor.register_gateway("gw-1", "us-east");
        for i in 0..10 {
            let success = i % 5 != 0;
            monitor.record_request("gw-1", success, Duration::from_millis(10 * (i as u64 + 1)));
        }
        let view = monitor.view();
        let health = view.health("gw-1").unwrap();
        assert_eq!(health.success_rate, 0.8);
        assert!(health.p50.is_some());
        assert!(health.p95 >= health.p50);
    }

    #[test]
    fn available_in_region_excludes_open_circuits_and_sorts_by_success_rate() {
        let monitor = AvailabilityMonitor::new();
        monitor.register_gateway("gw-good", "us-east");
        monitor.register_gateway("gw-bad", "us-east");
        monitor.register_gateway("gw-other-region", "us-west");
        monitor.record_request("gw-good", true, Duration::from_millis(5));
        for _ in 0..CIRCUIT_BREAKER_THRESHOLD {
            monitor.record_request("gw-bad", false, Duration::from_millis(5));
        }
        let view = monitor.view();
        let available = view.available_in_region("us-east");
        assert_eq!(available, vec!["gw-good".to_string()]);
    }

    #[test]
    fn unknown_gateway_is_treated_as_available() {
        let monitor = AvailabilityMonitor::new();
        let view = monitor.view();
        assert!(view.is_available("never-registered"));
        assert!(view.health("never-registered").is_none());
    }

    #[test]
    fn global_success_rate_averages_across_gateways() {
        let monitor = AvailabilityMonitor::new();
        monitor.register_gateway("gw-1", "us-east");
        monitor.register_gateway("gw-2", "us-east");
        monitor.record_request("gw-1", true, Duration::from_millis(5));
        monitor.record_request("gw-2", false, Duration::from_millis(5));
        let view = monitor.view();
        assert_eq!(view.global_success_rate(), 0.5);
        assert!(view.meets_sla(0.5));
        assert!(!view.meets_sla(0.9));
    }
}
