//! Integration coverage for the Merkle commitment and snapshot lifecycle
//! spanning multiple boundaries, crossing the crate's public API surface
//! rather than any single module's internals.

use chrono::Utc;

use boundary_kernel::{
    AuthorityLevel, Boundary, BoundaryId, Coordinate, FieldHasher, LayerType, MultiPolygon,
    PoseidonBn254Hasher, Polygon, Provenance, Ring, SnapshotMetadata, SnapshotStore,
    ValidityInterval,
};
use boundary_kernel::snapshot::InMemorySnapshotStore;

fn unit_square(offset: f64) -> MultiPolygon {
    let ring = Ring::new(vec![
        Coordinate::new(offset, 0.0),
        Coordinate::new(offset + 1.0, 0.0),
        Coordinate::new(offset + 1.0, 1.0),
        Coordinate::new(offset, 1.0),
        Coordinate::new(offset, 0.0),
    ]);
    MultiPolygon::single(Polygon::new(ring, vec![]))
}

fn boundary(id: &str, layer: LayerType, offset: f64) -> Boundary {
    Boundary {
        id: BoundaryId::new(id),
        layer_type: layer,
        name: id.to_string(),
        jurisdiction_path: "US.WI.Dane".to_string(),
        geometry: unit_square(offset),
        authority_level: AuthorityLevel::new(3).unwrap(),
        validity: ValidityInterval::new(Utc::now(), None).unwrap(),
        provenance: Provenance::new("https://example.test/source", Utc::now()),
    }
}

#[tokio::test]
async fn creating_a_snapshot_builds_a_tree_whose_proofs_all_replay_to_its_root() {
    let hasher = PoseidonBn254Hasher::new();
    let store = InMemorySnapshotStore::new();

    let boundaries: Vec<Boundary> = (0..5).map(|i| boundary(&format!("district-{i}"), LayerType::Ward, i as f64)).collect();

    let (snapshot, tree) = store.create_snapshot(&boundaries, &hasher, SnapshotMetadata::default()).await.unwrap();
    assert_eq!(snapshot.version, 1);
    assert_eq!(tree.leaf_count(), 8, "padded up to the next power of two");

    for b in &boundaries {
        let proof = tree.proof_for(&b.id).expect("every committed boundary has a proof");
        assert!(proof.verify(&hasher, tree.root()), "proof for {} must replay to the tree root", b.id);
    }
}

#[tokio::test]
async fn a_second_snapshot_is_versioned_and_diffs_cleanly_against_the_first() {
    let hasher = PoseidonBn254Hasher::new();
    let store = InMemorySnapshotStore::new();

    let first: Vec<Boundary> = (0..3).map(|i| boundary(&format!("ward-{i}"), LayerType::Ward, i as f64)).collect();
    store.create_snapshot(&first, &hasher, SnapshotMetadata::default()).await.unwrap();

    let mut second = first.clone();
    second.push(boundary("ward-3", LayerType::Ward, 3.0));
    let (snapshot_two, _) = store.create_snapshot(&second, &hasher, SnapshotMetadata::default()).await.unwrap();
    assert_eq!(snapshot_two.version, 2);

    let diff = store.diff(1, 2).await.unwrap();
    assert_eq!(diff.total_boundary_delta, 1);
    assert!(diff.merkle_root_changed);
    assert!(diff.added_layers.is_empty(), "Ward already existed in version 1");
    assert!(diff.modified_layers.contains_key(&LayerType::Ward));
}

#[tokio::test]
async fn diffing_a_version_against_itself_reports_no_changes() {
    let hasher = PoseidonBn254Hasher::new();
    let store = InMemorySnapshotStore::new();
    let boundaries: Vec<Boundary> = (0..3).map(|i| boundary(&format!("ward-{i}"), LayerType::Ward, i as f64)).collect();
    store.create_snapshot(&boundaries, &hasher, SnapshotMetadata::default()).await.unwrap();

    let diff = store.diff(1, 1).await.unwrap();
    assert!(!diff.merkle_root_changed);
    assert_eq!(diff.total_boundary_delta, 0);
    assert!(diff.added_layers.is_empty());
    assert!(diff.removed_layers.is_empty());
    assert!(diff.modified_layers.is_empty());
    assert!(diff.added_states.is_empty());
    assert!(diff.removed_states.is_empty());
}

#[tokio::test]
async fn content_identifier_assignment_is_idempotent_and_rejects_conflicting_values() {
    let hasher = PoseidonBn254Hasher::new();
    let store = InMemorySnapshotStore::new();
    let boundaries = vec![boundary("ward-0", LayerType::Ward, 0.0)];
    store.create_snapshot(&boundaries, &hasher, SnapshotMetadata::default()).await.unwrap();

    store.set_content_identifier(1, "bafy-first".to_string()).await.unwrap();
    store.set_content_identifier(1, "bafy-first".to_string()).await.unwrap();

    let err = store.set_content_identifier(1, "bafy-different".to_string()).await.unwrap_err();
    assert!(matches!(err, boundary_kernel::SnapshotError::ContentIdentifierConflict { .. }));

    let snapshot = store.get(1).await.unwrap().unwrap();
    assert_eq!(snapshot.content_identifier.as_deref(), Some("bafy-first"));
}

#[test]
fn the_same_boundary_set_commits_to_the_same_root_regardless_of_input_order() {
    let hasher = PoseidonBn254Hasher::new();
    let forward: Vec<Boundary> = (0..6).map(|i| boundary(&format!("precinct-{i}"), LayerType::VotingPrecinct, i as f64)).collect();
    let mut shuffled = forward.clone();
    shuffled.reverse();

    let leaves_forward: Vec<_> = forward
        .iter()
        .map(|b| (b.id.clone(), boundary_kernel::leaf_for_boundary(&hasher, &b.id, b.authority_level, boundary_kernel::DEFAULT_ACTION_DOMAIN)))
        .collect();
    let leaves_shuffled: Vec<_> = shuffled
        .iter()
        .map(|b| (b.id.clone(), boundary_kernel::leaf_for_boundary(&hasher, &b.id, b.authority_level, boundary_kernel::DEFAULT_ACTION_DOMAIN)))
        .collect();

    let tree_forward = boundary_kernel::MerkleTree::build(&hasher, leaves_forward);
    let tree_shuffled = boundary_kernel::MerkleTree::build(&hasher, leaves_shuffled);
    assert_eq!(tree_forward.root(), tree_shuffled.root());
}
