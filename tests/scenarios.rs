//! End-to-end scenario coverage spanning the geometry kernel, ingestion
//! pipeline, boundary resolution, and batch orchestration through the
//! crate's public API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};

use boundary_kernel::geometry::{validate_geometry, Coordinate, GeometryIssueKind, Polygon, Ring};
use boundary_kernel::{
    AuthorityLevel, BoundaryStore, Fips, FixtureMunicipalSource, InMemoryBoundaryStore, JobOptions,
    JobStatus, LayerType, MunicipalBoundary, TaskStatus, Tier,
};
use boundary_kernel::boundary::single_polygon_boundary;
use boundary_kernel::ingestion::{FeatureCollection, FixtureFeatureSource, IngestionValidator};
use boundary_kernel::registry::FileRegistryStore;
use boundary_kernel::resolver::{BoundaryResolver, ResolverConfig};
use boundary_kernel::resolver::geocoder::{FixtureGeocoder, GeocodeResult};
use boundary_kernel::orchestrator::store::InMemoryJobStore;
use boundary_kernel::orchestrator::{ExtractError, ExtractOutcome, Extractor, Orchestrator};

fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon {
    Polygon::new(
        Ring::new(vec![
            Coordinate::new(x0, y0),
            Coordinate::new(x1, y0),
            Coordinate::new(x1, y1),
            Coordinate::new(x0, y1),
            Coordinate::new(x0, y0),
        ]),
        Vec::new(),
    )
}

fn temp_registry_dir(label: &str) -> std::path::PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("boundary-kernel-{label}-{}", uuid::Uuid::new_v4()));
    dir
}

/// A self-intersecting (bowtie) ring must be rejected with a witness point,
/// not merely flagged as "invalid" without detail.
#[test]
fn a_bowtie_ring_is_rejected_with_a_witness_point() {
    let bowtie = Polygon::new(
        Ring::new(vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 1.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(0.0, 1.0),
            Coordinate::new(0.0, 0.0),
        ]),
        Vec::new(),
    );
    let validation = validate_geometry(&bowtie);
    assert!(!validation.passed);
    let issue = validation
        .issues
        .iter()
        .find(|i| matches!(i.kind, GeometryIssueKind::BowtieOrSelfIntersection))
        .expect("a bowtie must surface a self-intersection issue");
    assert!(issue.location.is_some(), "the issue should carry a witness point");
}

/// A perfect eight-way tessellation of a municipal square passes full-tier
/// ingestion end to end, against a real (temp-directory) registry store.
#[tokio::test]
async fn full_tier_ingestion_passes_for_a_clean_tessellation_against_a_file_registry() {
    let registry: Arc<dyn boundary_kernel::RegistryStore> = Arc::new(FileRegistryStore::new(temp_registry_dir("scenario-ingest")));

    let mut features = FixtureFeatureSource::new();
    let strips: Vec<_> = (0..8)
        .map(|i| boundary_kernel::geometry::MultiPolygon::single(square(i as f64 / 8.0, 0.0, (i + 1) as f64 / 8.0, 1.0)))
        .collect();
    features.insert("https://example.gov/districts", FeatureCollection { features: strips });

    let mut municipal = FixtureMunicipalSource::new();
    municipal.insert(
        "5553000",
        MunicipalBoundary { polygon: boundary_kernel::geometry::MultiPolygon::single(square(0.0, 0.0, 1.0, 1.0)), land_area: 1.0, water_area: None, name: "Example City".to_string(), state: "WI".to_string() },
    );

    let validator = IngestionValidator::new(features, municipal, registry);
    let result = validator
        .validate(&Fips::new("5553000").unwrap(), "https://example.gov/districts", Tier::Full)
        .await
        .unwrap();
    assert!(result.valid, "expected the eight-strip tessellation to pass: {result:?}");
    assert_eq!(result.achieved_tier, Tier::Full);
}

/// Resolving a coordinate through the address/coordinate pipeline returns
/// the finest-precision boundary and serves a second lookup from cache.
#[tokio::test]
async fn resolving_the_same_address_twice_hits_cache_on_the_second_call() {
    let store = Arc::new(InMemoryBoundaryStore::new());
    let epoch = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    store
        .put(single_polygon_boundary(
            "ward-1",
            LayerType::Ward,
            "Ward One",
            Ring::new(vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(2.0, 0.0),
                Coordinate::new(2.0, 2.0),
                Coordinate::new(0.0, 2.0),
                Coordinate::new(0.0, 0.0),
            ]),
            AuthorityLevel::new(3).unwrap(),
            epoch,
        ))
        .await
        .unwrap();

    let mut geocoder = FixtureGeocoder::new();
    geocoder.insert("1 Main St", GeocodeResult { lat: 1.0, lng: 1.0, confidence: 95, match_type: "rooftop".to_string() });

    let resolver = BoundaryResolver::new(geocoder, store, ResolverConfig::default());
    let first = resolver.resolve_address("1 Main St", Utc::now()).await.unwrap();
    assert!(!first.cached);
    assert_eq!(first.boundary.id.as_str(), "ward-1");

    let second = resolver.resolve_address("1 Main St", Utc::now()).await.unwrap();
    assert!(second.cached, "repeating the same address should hit the cache");
}

struct TimedExtractor {
    delay: Duration,
}

#[async_trait::async_trait]
impl Extractor for TimedExtractor {
    async fn extract(&self, _state: &str, _layer: LayerType) -> Result<ExtractOutcome, ExtractError> {
        tokio::time::sleep(self.delay).await;
        Ok(ExtractOutcome { actual_count: 1 })
    }
}

/// Five ten-millisecond tasks under concurrency 2 take roughly three
/// batches' worth of wall-clock time, not five sequential ones and not one
/// fully parallel batch: the worker pool is genuinely bounded, not a
/// fire-everything-at-once queue.
#[tokio::test]
async fn bounded_concurrency_runs_tasks_in_capped_batches_not_all_at_once() {
    let registry: Arc<dyn boundary_kernel::RegistryStore> = Arc::new(FileRegistryStore::new(temp_registry_dir("scenario-orchestrator")));
    for state in ["AA", "BB", "CC", "DD", "EE"] {
        registry
            .add_expected_count(
                boundary_kernel::registry::ExpectedCountEntry {
                    fips: state.to_string(),
                    city_name: "Test City".to_string(),
                    state: state.to_string(),
                    expected_count: 1,
                    governance_type: boundary_kernel::registry::GovernanceType::DistrictBased,
                    source_url: "https://example.test".to_string(),
                    last_verified: Utc::now(),
                    confidence: 100,
                },
                "test",
                "fixture setup",
            )
            .await
            .unwrap();
    }

    let extractor = Arc::new(TimedExtractor { delay: Duration::from_millis(10) });
    let orchestrator = Orchestrator::new(extractor, registry, Arc::new(InMemoryJobStore::new()));
    let options = JobOptions { concurrency: 2, ..Default::default() };

    let start = Instant::now();
    let job = orchestrator
        .orchestrate_states(vec!["AA", "BB", "CC", "DD", "EE"].into_iter().map(String::from).collect(), vec![LayerType::County], options, None)
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.tasks.iter().all(|t| t.status == TaskStatus::Completed));
    assert!(elapsed >= Duration::from_millis(25), "five 10ms tasks at concurrency 2 must take at least three batches, took {elapsed:?}");
    assert!(elapsed < Duration::from_millis(200), "bounded concurrency should not serialize every task, took {elapsed:?}");
}
