//! Boundary Kernel REST Service
//!
//! Exposes ingestion validation, boundary resolution, snapshot/proof
//! retrieval, and batch orchestration as a REST API.
//!
//! ## Endpoints
//!
//! - `POST /api/ingestion/validate` - Validate a candidate source against a FIPS
//! - `POST /api/registry/quarantine` - Quarantine a FIPS
//! - `GET /api/registry/audit-log` - Read the registry audit log
//! - `POST /api/resolve/address` - Resolve a free-text address to a boundary
//! - `POST /api/resolve/coordinate` - Resolve a coordinate to a boundary
//! - `POST /api/snapshots` - Create a new snapshot
//! - `GET /api/snapshots/latest` - Fetch the latest snapshot
//! - `GET /api/snapshots/:version` - Fetch a snapshot by version
//! - `GET /api/snapshots/:version/proof/:boundary_id` - Fetch a proof template
//! - `POST /api/orchestrator/jobs` - Start a batch orchestration job
//! - `GET /api/orchestrator/jobs` - List recent jobs
//! - `GET /api/orchestrator/jobs/:id` - Fetch a job's status
//! - `POST /api/orchestrator/jobs/:id/resume` - Resume an interrupted job
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health/startup` - Startup probe

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{metrics_middleware, record_ingestion, record_resolution};
pub use routes::{create_router, AppState};
pub use state::{ServiceConfig, ServiceState};
