//! Shared service state: the concrete collaborator graph the HTTP layer
//! dispatches into, and its environment-driven construction.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::boundary::InMemoryBoundaryStore;
use crate::crypto::PoseidonBn254Hasher;
use crate::ingestion::{HttpFeatureSource, IngestionValidator};
use crate::mbr::{CachingMunicipalSource, FetchClientConfig, HttpMunicipalSource};
use crate::orchestrator::{ExtractorConfig, HttpExtractor, InMemoryJobStore, JobStore, Orchestrator};
use crate::registry::{FileRegistryStore, RegistryStore};
use crate::resolver::geocoder::HttpGeocoder;
use crate::resolver::{BoundaryResolver, ResolverConfig};
use crate::snapshot::{FileSnapshotStore, InMemorySnapshotStore, SnapshotStore};

/// The ingestion pipeline instantiated over the HTTP-backed collaborators
/// the service binary actually uses.
pub type ServiceIngestionValidator = IngestionValidator<HttpFeatureSource, CachingMunicipalSource<HttpMunicipalSource>>;

/// The boundary resolver instantiated over its HTTP-backed geocoder and the
/// in-memory candidate store.
pub type ServiceBoundaryResolver = BoundaryResolver<HttpGeocoder, InMemoryBoundaryStore>;

/// The batch orchestrator instantiated over its HTTP-backed extractor.
pub type ServiceOrchestrator = Orchestrator<HttpExtractor>;

/// Where the service's durable stores persist, and where it binds.
///
/// Every field follows the pattern already established by
/// `FetchClientConfig::from_env`: read a named env var, parse, fall back to
/// a documented default.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Listen address for the HTTP server.
    pub bind_addr: SocketAddr,
    /// `"json"` for structured logs, `"pretty"` for local development.
    pub log_format: String,
    /// Directory backing the NDJSON registry tables and audit log.
    pub registry_dir: PathBuf,
    /// Directory backing snapshot and proof-template documents.
    pub snapshot_dir: PathBuf,
    /// Directory backing durable job records. `None` keeps jobs in memory
    /// only, which does not survive a restart.
    pub job_store_dir: Option<PathBuf>,
}

impl ServiceConfig {
    /// Build from environment variables.
    ///
    /// - `SERVICE_BIND_ADDR` (default `0.0.0.0:8080`)
    /// - `LOG_FORMAT` (default `json`)
    /// - `REGISTRY_DIR` (default `./data/registry`)
    /// - `SNAPSHOT_DIR` (default `./data/snapshots`)
    /// - `JOB_STORE_DIR` (unset keeps jobs in memory)
    pub fn from_env() -> Self {
        let bind_addr = std::env::var("SERVICE_BIND_ADDR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| "0.0.0.0:8080".parse().expect("static default parses"));
        let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
        let registry_dir = std::env::var("REGISTRY_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./data/registry"));
        let snapshot_dir = std::env::var("SNAPSHOT_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./data/snapshots"));
        let job_store_dir = std::env::var("JOB_STORE_DIR").ok().map(PathBuf::from);
        Self { bind_addr, log_format, registry_dir, snapshot_dir, job_store_dir }
    }
}

/// Shared service state: every durable store and pipeline the HTTP routes
/// dispatch into, wrapped in `Arc` for cheap cloning into handlers.
#[derive(Clone)]
pub struct ServiceState {
    /// Registry of expected counts, quarantine, at-large entries, and the
    /// audit log.
    pub registry: Arc<dyn RegistryStore>,
    /// The tiered ingestion validation pipeline.
    pub ingestion: Arc<ServiceIngestionValidator>,
    /// Resolved-boundary candidate store backing the Boundary Resolver.
    pub boundary_store: Arc<InMemoryBoundaryStore>,
    /// Address/coordinate-to-boundary resolution pipeline.
    pub resolver: Arc<ServiceBoundaryResolver>,
    /// Versioned snapshot and proof-template persistence.
    pub snapshots: Arc<dyn SnapshotStore>,
    /// Hasher backing snapshot creation's Merkle tree build.
    pub hasher: Arc<PoseidonBn254Hasher>,
    /// The batch orchestrator driving state/layer extraction jobs.
    pub orchestrator: Arc<ServiceOrchestrator>,
}

impl ServiceState {
    /// Construct service state from environment-driven configuration,
    /// logging a warning wherever an optional collaborator degrades to an
    /// in-memory fallback.
    pub fn from_env(config: &ServiceConfig) -> Self {
        let http_client = reqwest::Client::new();

        let registry: Arc<dyn RegistryStore> = Arc::new(FileRegistryStore::new(&config.registry_dir));

        let municipal_source = CachingMunicipalSource::new(
            HttpMunicipalSource::new(http_client.clone(), FetchClientConfig::from_env()),
            1024,
        );
        let feature_source = HttpFeatureSource::new(http_client.clone());
        let ingestion = Arc::new(IngestionValidator::new(feature_source, municipal_source, Arc::clone(&registry)));

        let boundary_store = Arc::new(InMemoryBoundaryStore::new());
        let geocoder_endpoint = std::env::var("GEOCODER_ENDPOINT").unwrap_or_else(|_| {
            tracing::warn!("GEOCODER_ENDPOINT not set, using placeholder endpoint");
            "https://geocoder.example.invalid/v1/lookup".to_string()
        });
        let geocoder = HttpGeocoder::new(http_client.clone(), geocoder_endpoint);
        let resolver = Arc::new(BoundaryResolver::new(geocoder, Arc::clone(&boundary_store), ResolverConfig::default()));

        let snapshots: Arc<dyn SnapshotStore> = if config.snapshot_dir.as_os_str().is_empty() {
            Arc::new(InMemorySnapshotStore::new())
        } else {
            Arc::new(FileSnapshotStore::new(&config.snapshot_dir))
        };
        let hasher = Arc::new(PoseidonBn254Hasher::new());

        let job_store: Arc<dyn JobStore> = match &config.job_store_dir {
            Some(dir) => Arc::new(crate::orchestrator::FileJobStore::new(dir)),
            None => {
                tracing::warn!("JOB_STORE_DIR not set, job records will not survive a restart");
                Arc::new(InMemoryJobStore::new())
            }
        };
        let extractor = Arc::new(HttpExtractor::new(http_client, ExtractorConfig::from_env()));
        let orchestrator = Arc::new(Orchestrator::new(extractor, Arc::clone(&registry), job_store));

        Self { registry, ingestion, boundary_store, resolver, snapshots, hasher, orchestrator }
    }
}
