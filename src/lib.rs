//! # boundary-kernel
//!
//! Deterministic ingestion, validation, Merkle commitment, and distribution
//! for legislative and municipal boundary data.
//!
//! The kernel answers one question:
//!
//! > Given a candidate source for a city's council districts, is it a valid
//! > tessellation of that city, and can a client later prove a coordinate
//! > falls in a specific district without trusting any single party?
//!
//! ## Core contract
//!
//! 1. Gate a candidate source through the registry, structural parsing,
//!    sanity checks, and a four-axiom tessellation proof.
//! 2. Commit validated boundaries into a versioned, Merkle-rooted snapshot.
//! 3. Replicate the snapshot across a content-addressed storage network.
//! 4. Resolve a coordinate or address to its containing boundary, locally or
//!    against a distributed gateway, with a Merkle inclusion proof available
//!    for independent verification.
//!
//! ## Architecture
//!
//! ```text
//! Source → Ingestion Validator → Boundary Store → Snapshot Manager
//!              ↑        ↓              (Merkle root + proof templates)
//!          Registry   Geometry                     ↓
//!           Store      Kernel              Update Coordinator
//!                                                   ↓
//!                                   Pinning-Service Abstraction
//!                                                   ↓
//!                            Fallback Resolver ← Availability Monitor
//!                                   ↓
//!                           Boundary Resolver → verified district
//! ```
//!
//! ## Determinism guarantees
//!
//! - Leaf encoding is a pure function of public boundary attributes; no
//!   client secret is ever committed.
//! - Leaves are sorted by boundary id before tree construction, so the same
//!   boundary set always produces the same root regardless of input order.
//! - Snapshot versions are monotonic and gap-free; job-state writes are
//!   totally ordered per job.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ids;

pub mod geometry;
pub mod crypto;

pub mod boundary;
pub mod registry;
pub mod sanity;
pub mod tessellation;
pub mod mbr;
pub mod ingestion;

pub mod resolver;

pub mod snapshot;

pub mod pinning;
pub mod availability;
pub mod fallback;
pub mod coordinator;

pub mod orchestrator;

#[cfg(feature = "service")]
pub mod service;

// Re-exports: shared identifiers and enumerations.
pub use ids::{AuthorityLevel, AuthorityLevelError, BoundaryId, Fips, FipsError, JobId, LayerType, SnapshotId};

// Re-exports: Geometry Kernel.
pub use geometry::{
    difference_area, intersect_area, multipolygon_area, multipolygon_centroid, point_in_multipolygon,
    point_in_polygon, polygon_area, polygon_centroid, rewind, union_area, union_area_many,
    validate_geometry, validate_ring, BoundingBox, Coordinate, GeometryIssue, GeometryIssueKind,
    GeometryValidation, MultiPolygon, Polygon, Ring, RingError, Severity,
};

// Re-exports: Crypto Primitives.
pub use crypto::{CryptoError, FieldElement, FieldHasher, PoseidonBn254Hasher, FIELD_MODULUS_DECIMAL, FIELD_MODULUS_LIMBS};

// Re-exports: Boundary data model and store.
pub use boundary::{Boundary, BoundaryError, BoundaryStore, InMemoryBoundaryStore, Provenance, ValidityInterval};

// Re-exports: Registry Store.
pub use registry::{
    AtLargeEntry, AuditAction, AuditEntry, ElectionMethod, ExpectedCountEntry, FailurePattern,
    FileRegistryStore, GovernanceType, QuarantineEntry, RegistryError, RegistryName, RegistryStore,
};

// Re-exports: Sanity Checker.
pub use sanity::{check_sanity, SanityFailure, SanityResult, SanityThresholds};

// Re-exports: Tessellation Prover.
pub use tessellation::{
    prove_tessellation, AxiomFailure, CoverageOverride, TessellationExceptions, TessellationInputs,
    TessellationResult,
};

// Re-exports: Municipal Boundary Resolver.
pub use mbr::{CachingMunicipalSource, FixtureMunicipalSource, HttpMunicipalSource, MbrError, MunicipalBoundary, MunicipalSource};

// Re-exports: Ingestion Validator.
pub use ingestion::{FeatureCollection, FeatureSource, FetchError, IngestionError, IngestionValidator, Tier, ValidationError, ValidationResult};

// Re-exports: Point-in-Polygon Engine and Boundary Resolver.
pub use resolver::{at_precision, find_containing_boundaries, find_finest, BoundaryMatch, BoundaryResolver, GeocodeResult, Geocoder, GeocoderError, ResolveError, ResolverConfig};

// Re-exports: Snapshot and Merkle Commitment.
pub use snapshot::{
    leaf_for_boundary, Diff, FileSnapshotStore, InMemorySnapshotStore, LayerDiff, MerkleTree,
    ProofTemplate, Snapshot, SnapshotError, SnapshotMetadata, SnapshotStore,
};

// Re-exports: Pinning-Service Abstraction and Regional Service.
pub use pinning::{PinOptions, PinOutcome, PinningBackend, PinningError, PinningService, PinningServiceFactory, RegionPinOutcome, RegionalService};

// Re-exports: Availability Monitor.
pub use availability::{AvailabilityMonitor, GatewayHealth, GatewayHealthView};

// Re-exports: Fallback Resolver.
pub use fallback::{FallbackResolver, GatewayFetchError, GatewayFetcher, ResolveCriteria, ResolveOutcome};

// Re-exports: Update Coordinator.
pub use coordinator::{should_update_boundary, PhaseOutcome, PhaseSpec, RegionOutcome, RolloutOutcome, RolloutPlan, UpdateCoordinator, UpdateError};

// Re-exports: Batch Orchestrator.
pub use orchestrator::{
    ExtractError, ExtractOutcome, Extractor, ExtractorConfig, FileJobStore, HttpExtractor,
    InMemoryJobStore, JobOptions, JobState, JobStatus, JobStore, JobStoreError, OrchestrationError,
    Orchestrator, ProgressEvent, ProgressStatus, TaskRecord, TaskStatus, ValidationReport,
    ValidationReportRow, ValidationReportSummary,
};

// Re-exports: HTTP service layer (when the `service` feature is enabled).
#[cfg(feature = "service")]
pub use service::{create_router, ServiceConfig, ServiceState};

/// Schema version for all boundary kernel persisted documents (registry
/// entries, snapshots, proof templates, job state).
pub const BOUNDARY_KERNEL_SCHEMA_VERSION: &str = "1.0.0";

/// The action domain every Merkle leaf is scoped to by default. See
/// [`snapshot::tree::DEFAULT_ACTION_DOMAIN`].
pub const DEFAULT_ACTION_DOMAIN: &str = snapshot::tree::DEFAULT_ACTION_DOMAIN;
