//! Axum routes for the boundary kernel service.

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::Coordinate;
use crate::ids::{BoundaryId, Fips, JobId, LayerType};
use crate::ingestion::Tier;
use crate::orchestrator::{JobOptions, JobState};
use crate::registry::{FailurePattern, QuarantineEntry};
use crate::snapshot::tree::ProofTemplate;

use super::state::ServiceState;

/// Type alias for the Axum application state.
pub type AppState = ServiceState;

// ============================================================================
// Error response
// ============================================================================

/// Structured error response, matching the failure-taxonomy-plus-remediation
/// shape the error handling design requires of every user-visible failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub error: String,
}

impl ErrorResponse {
    fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self { code: code.into(), error: error.into() }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        tracing::warn!(code = %self.code, error = %self.error, "request error");
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(code: &str, message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(code, message)))
}

fn not_found(code: &str, message: impl Into<String>) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new(code, message)))
}

fn internal(code: &str, message: impl Into<String>) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new(code, message)))
}

// ============================================================================
// Ingestion
// ============================================================================

/// Request to validate one candidate source against its registered FIPS.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    /// Census PLACE FIPS code.
    pub fips: String,
    /// Candidate feature collection URL.
    pub url: String,
    /// How far to run the pipeline: `"structure"`, `"sanity"`, or `"full"`.
    pub tier: String,
}

/// Validation outcome, flattened for the wire.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub valid: bool,
    pub achieved_tier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

fn tier_name(tier: Tier) -> &'static str {
    match tier {
        Tier::Structure => "structure",
        Tier::Sanity => "sanity",
        Tier::Full => "full",
    }
}

async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let fips = Fips::new(request.fips.clone()).map_err(|e| bad_request("INVALID_FIPS", e.to_string()))?;
    let tier = match request.tier.as_str() {
        "structure" => Tier::Structure,
        "sanity" => Tier::Sanity,
        "full" => Tier::Full,
        other => return Err(bad_request("INVALID_TIER", format!("unknown tier '{other}'"))),
    };

    let result = state
        .ingestion
        .validate(&fips, &request.url, tier)
        .await
        .map_err(|e| internal("REGISTRY_ERROR", e.to_string()))?;

    super::middleware::record_ingestion(tier_name(result.achieved_tier), result.valid);

    Ok(Json(IngestResponse {
        valid: result.valid,
        achieved_tier: tier_name(result.achieved_tier).to_string(),
        failure: result.failure.as_ref().map(|f| format!("{f:?}")),
        remediation: result.failure.as_ref().map(|f| f.remediation_hint().to_string()),
        warning: result.warning.clone(),
    }))
}

// ============================================================================
// Registry
// ============================================================================

/// Request to quarantine a FIPS, mirroring the fields [`QuarantineEntry`]
/// persists.
#[derive(Debug, Clone, Deserialize)]
pub struct QuarantineRequest {
    pub fips: String,
    pub city_name: String,
    pub state: String,
    pub failure_pattern: FailurePattern,
    pub reason: String,
    pub actor: String,
}

async fn quarantine_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuarantineRequest>,
) -> Result<StatusCode, ApiError> {
    let before = state.registry.expected_count(&request.fips).await.map_err(|e| internal("REGISTRY_ERROR", e.to_string()))?;
    let entry = QuarantineEntry {
        fips: request.fips.clone(),
        city_name: request.city_name,
        state: request.state,
        failure_pattern: request.failure_pattern,
        reason: request.reason,
        timestamp: Utc::now(),
    };
    state
        .registry
        .quarantine(entry, before, &request.actor)
        .await
        .map_err(|e| internal("REGISTRY_ERROR", e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn audit_log_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<crate::registry::AuditEntry>>, ApiError> {
    let entries = state.registry.audit_log().await.map_err(|e| internal("REGISTRY_ERROR", e.to_string()))?;
    Ok(Json(entries))
}

// ============================================================================
// Resolution
// ============================================================================

/// Request to resolve a free-text address to its finest-precision boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveAddressRequest {
    pub address: String,
    /// Instant to filter boundary validity against; defaults to now.
    pub at: Option<DateTime<Utc>>,
}

/// Request to resolve a raw coordinate.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveCoordinateRequest {
    pub lat: f64,
    pub lng: f64,
    pub at: Option<DateTime<Utc>>,
}

/// A resolved boundary match, flattened for the wire.
#[derive(Debug, Clone, Serialize)]
pub struct ResolveResponse {
    pub boundary_id: String,
    pub layer_type: LayerType,
    pub name: String,
    pub jurisdiction_path: String,
    pub cached: bool,
}

async fn resolve_address_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResolveAddressRequest>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let at = request.at.unwrap_or_else(Utc::now);
    let result = state
        .resolver
        .resolve_address(&request.address, at)
        .await
        .map_err(|e| bad_request("RESOLVE_FAILED", e.to_string()))?;
    super::middleware::record_resolution(&result.boundary.layer_type.to_string(), result.cached);
    Ok(Json(ResolveResponse {
        boundary_id: result.boundary.id.to_string(),
        layer_type: result.boundary.layer_type,
        name: result.boundary.name,
        jurisdiction_path: result.boundary.jurisdiction_path,
        cached: result.cached,
    }))
}

async fn resolve_coordinate_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResolveCoordinateRequest>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let at = request.at.unwrap_or_else(Utc::now);
    let point = Coordinate::new(request.lng, request.lat);
    let result = state
        .resolver
        .resolve_coordinate(point, at)
        .await
        .map_err(|e| bad_request("RESOLVE_FAILED", e.to_string()))?;
    super::middleware::record_resolution(&result.boundary.layer_type.to_string(), result.cached);
    Ok(Json(ResolveResponse {
        boundary_id: result.boundary.id.to_string(),
        layer_type: result.boundary.layer_type,
        name: result.boundary.name,
        jurisdiction_path: result.boundary.jurisdiction_path,
        cached: result.cached,
    }))
}

// ============================================================================
// Snapshots
// ============================================================================

/// Snapshot summary, flattened for the wire.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotResponse {
    pub id: String,
    pub version: u64,
    pub merkle_root_hex: String,
    pub timestamp: DateTime<Utc>,
    pub content_identifier: Option<String>,
    pub layer_counts: std::collections::BTreeMap<LayerType, usize>,
}

impl From<crate::snapshot::Snapshot> for SnapshotResponse {
    fn from(snapshot: crate::snapshot::Snapshot) -> Self {
        Self {
            id: snapshot.id.to_string(),
            version: snapshot.version,
            merkle_root_hex: format!("0x{:x}", field_to_u64(snapshot.merkle_root)),
            timestamp: snapshot.timestamp,
            content_identifier: snapshot.content_identifier,
            layer_counts: snapshot.layer_counts,
        }
    }
}

fn field_to_u64(element: crate::crypto::FieldElement) -> u64 {
    // `FieldElement` exposes no public accessor beyond (de)serialization;
    // round through JSON to recover the inner value for hex formatting.
    serde_json::to_value(element).ok().and_then(|v| v.as_u64()).unwrap_or(0)
}

async fn create_snapshot_handler(State(state): State<Arc<AppState>>) -> Result<Json<SnapshotResponse>, ApiError> {
    let mut boundaries = Vec::new();
    for layer in LayerType::ALL {
        let mut layer_boundaries = state
            .boundary_store
            .list_by_layer(layer)
            .await
            .map_err(|e| internal("STORE_ERROR", e.to_string()))?;
        boundaries.append(&mut layer_boundaries);
    }
    let metadata = crate::snapshot::SnapshotMetadata::default();
    let (snapshot, _tree) = state
        .snapshots
        .create_snapshot(&boundaries, state.hasher.as_ref(), metadata)
        .await
        .map_err(|e| internal("SNAPSHOT_ERROR", e.to_string()))?;
    Ok(Json(snapshot.into()))
}

async fn latest_snapshot_handler(State(state): State<Arc<AppState>>) -> Result<Json<SnapshotResponse>, ApiError> {
    let snapshot = state.snapshots.latest().await.map_err(|e| internal("SNAPSHOT_ERROR", e.to_string()))?;
    snapshot.map(|s| Json(s.into())).ok_or_else(|| not_found("NO_SNAPSHOT", "no snapshot has been created yet"))
}

async fn get_snapshot_handler(
    State(state): State<Arc<AppState>>,
    Path(version): Path<u64>,
) -> Result<Json<SnapshotResponse>, ApiError> {
    let snapshot = state.snapshots.get(version).await.map_err(|e| internal("SNAPSHOT_ERROR", e.to_string()))?;
    snapshot.map(|s| Json(s.into())).ok_or_else(|| not_found("SNAPSHOT_NOT_FOUND", format!("no snapshot at version {version}")))
}

async fn snapshot_proof_handler(
    State(state): State<Arc<AppState>>,
    Path((version, boundary_id)): Path<(u64, String)>,
) -> Result<Json<ProofTemplate>, ApiError> {
    let template = state
        .snapshots
        .proof_template(version, &BoundaryId::new(boundary_id.clone()))
        .await
        .map_err(|e| internal("SNAPSHOT_ERROR", e.to_string()))?;
    template.map(Json).ok_or_else(|| not_found("PROOF_NOT_FOUND", format!("no proof for {boundary_id} at version {version}")))
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Request to start a new orchestration job.
#[derive(Debug, Clone, Deserialize)]
pub struct StartJobRequest {
    pub states: Vec<String>,
    pub layers: Vec<LayerType>,
    #[serde(default)]
    pub options: Option<JobOptionsDto>,
}

/// Wire representation of [`JobOptions`]; every field optional with the
/// same defaults `JobOptions::default()` uses.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct JobOptionsDto {
    pub concurrency: Option<usize>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub task_timeout_ms: Option<u64>,
    pub continue_on_error: Option<bool>,
}

impl From<JobOptionsDto> for JobOptions {
    fn from(dto: JobOptionsDto) -> Self {
        let default = JobOptions::default();
        Self {
            concurrency: dto.concurrency.unwrap_or(default.concurrency),
            max_retries: dto.max_retries.unwrap_or(default.max_retries),
            retry_delay: dto.retry_delay_ms.map(std::time::Duration::from_millis).unwrap_or(default.retry_delay),
            task_timeout: dto.task_timeout_ms.map(std::time::Duration::from_millis).unwrap_or(default.task_timeout),
            continue_on_error: dto.continue_on_error.unwrap_or(default.continue_on_error),
        }
    }
}

async fn start_job_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartJobRequest>,
) -> Result<Json<JobState>, ApiError> {
    let options = request.options.unwrap_or_default().into();
    let job = state
        .orchestrator
        .orchestrate_states(request.states, request.layers, options, None)
        .await
        .map_err(|e| internal("ORCHESTRATION_ERROR", e.to_string()))?;
    Ok(Json(job))
}

async fn get_job_handler(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<JobState>, ApiError> {
    let job = state
        .orchestrator
        .get_job_status(JobId::new(id))
        .await
        .map_err(|e| internal("ORCHESTRATION_ERROR", e.to_string()))?;
    job.map(Json).ok_or_else(|| not_found("JOB_NOT_FOUND", format!("no job {id}")))
}

async fn list_jobs_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<JobState>>, ApiError> {
    let jobs = state.orchestrator.list_jobs(50).await.map_err(|e| internal("ORCHESTRATION_ERROR", e.to_string()))?;
    Ok(Json(jobs))
}

async fn resume_job_handler(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<JobState>, ApiError> {
    let job = state
        .orchestrator
        .resume_job(JobId::new(id), None)
        .await
        .map_err(|e| internal("ORCHESTRATION_ERROR", e.to_string()))?;
    Ok(Json(job))
}

// ============================================================================
// Health
// ============================================================================

/// Detailed health response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub registry_reachable: bool,
    pub snapshot_store_reachable: bool,
}

/// Liveness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct LivenessResponse {
    pub status: String,
}

/// Readiness/startup probe response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub details: Option<String>,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let registry_reachable = state.registry.audit_log().await.is_ok();
    let snapshot_store_reachable = state.snapshots.latest().await.is_ok();
    Json(HealthResponse {
        status: if registry_reachable && snapshot_store_reachable { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        registry_reachable,
        snapshot_store_reachable,
    })
}

async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "alive".to_string() })
}

async fn readiness_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    if state.registry.audit_log().await.is_ok() {
        Ok(Json(ReadinessResponse { ready: true, details: None }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse { ready: false, details: Some("registry store unreachable".to_string()) }),
        ))
    }
}

async fn startup_handler(
    state: State<Arc<AppState>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    readiness_handler(state).await
}

// ============================================================================
// Router construction
// ============================================================================

/// Create the Axum router for the boundary kernel service.
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/api/ingestion/validate", post(ingest_handler))
        .route("/api/registry/quarantine", post(quarantine_handler))
        .route("/api/registry/audit-log", get(audit_log_handler))
        .route("/api/resolve/address", post(resolve_address_handler))
        .route("/api/resolve/coordinate", post(resolve_coordinate_handler))
        .route("/api/snapshots", post(create_snapshot_handler))
        .route("/api/snapshots/latest", get(latest_snapshot_handler))
        .route("/api/snapshots/:version", get(get_snapshot_handler))
        .route("/api/snapshots/:version/proof/:boundary_id", get(snapshot_proof_handler))
        .route("/api/orchestrator/jobs", post(start_job_handler).get(list_jobs_handler))
        .route("/api/orchestrator/jobs/:id", get(get_job_handler))
        .route("/api/orchestrator/jobs/:id/resume", post(resume_job_handler))
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/health/startup", get(startup_handler))
        .with_state(state)
}
