//! Service middleware for metrics and request tracking.
//!
//! ## Metrics Exposed
//!
//! - `boundary_kernel_requests_total` - request count by path, method, status
//! - `boundary_kernel_request_duration_seconds` - request latency
//! - `boundary_kernel_ingestion_total` - ingestion validation outcomes
//! - `boundary_kernel_resolution_total` - resolution outcomes

use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::info;

/// Metrics middleware that records request counts and latency.
///
/// Uses tracing for now - can be upgraded to prometheus metrics later.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    info!(
        target: "boundary_kernel::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request_metric"
    );

    response
}

/// Normalize path for metrics to avoid high cardinality.
///
/// Replaces UUIDs and other dynamic path segments with placeholders.
fn normalize_path(path: &str) -> String {
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}"
    ).unwrap();

    uuid_regex.replace_all(path, ":id").to_string()
}

/// Record an ingestion validation outcome.
pub fn record_ingestion(achieved_tier: &str, valid: bool) {
    info!(
        target: "boundary_kernel::metrics",
        metric_type = "ingestion",
        achieved_tier = achieved_tier,
        valid = valid,
        "ingestion_metric"
    );
}

/// Record a resolution outcome.
pub fn record_resolution(layer_type: &str, cached: bool) {
    info!(
        target: "boundary_kernel::metrics",
        metric_type = "resolution",
        layer_type = layer_type,
        cached = cached,
        "resolution_metric"
    );
}
