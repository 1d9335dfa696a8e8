//! Versioned snapshot persistence: snapshot creation, proof-template
//! storage, content-identifier assignment, and diff between versions.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::boundary::Boundary;
use crate::crypto::FieldHasher;
use crate::ids::{BoundaryId, JobId, LayerType, SnapshotId};
use crate::snapshot::tree::{leaf_for_boundary, MerkleTree, ProofTemplate, DEFAULT_ACTION_DOMAIN};

/// Per-snapshot build metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// TIGER (or equivalent) vintage year, when applicable.
    pub vintage_year: Option<i32>,
    /// States included in this snapshot, as two-letter codes.
    pub states: Vec<String>,
    /// Layers included in this snapshot.
    pub layers: Vec<LayerType>,
    /// Wall-clock build duration.
    pub build_duration_ms: u64,
    /// Source checksum per originating document URL, for provenance.
    pub source_checksum: BTreeMap<String, String>,
    /// The orchestrator job that produced this snapshot, if any.
    pub originating_job_id: Option<JobId>,
    /// The previous snapshot version this one supersedes.
    pub previous_version: Option<u64>,
    /// Free-text operator notes.
    pub notes: Option<String>,
}

/// An immutable versioned commitment to a set of boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique snapshot id.
    pub id: SnapshotId,
    /// Monotonic, 1-based, gap-free version number.
    pub version: u64,
    /// The Merkle tree's root.
    pub merkle_root: crate::crypto::FieldElement,
    /// When the snapshot was created.
    pub timestamp: DateTime<Utc>,
    /// Content identifier, assigned exactly once after distribution.
    pub content_identifier: Option<String>,
    /// Boundary count per layer.
    pub layer_counts: BTreeMap<LayerType, usize>,
    /// Build metadata.
    pub metadata: SnapshotMetadata,
}

/// Added/removed/modified summary between two snapshot versions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerDiff {
    /// Boundary count in `from`.
    pub from_count: usize,
    /// Boundary count in `to`.
    pub to_count: usize,
    /// `to_count - from_count`.
    pub delta: i64,
}

/// Result of comparing two snapshot versions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    /// Layers present in `to` but not `from`.
    pub added_layers: Vec<LayerType>,
    /// Layers present in `from` but not `to`.
    pub removed_layers: Vec<LayerType>,
    /// Layers present in both, with count deltas.
    pub modified_layers: BTreeMap<LayerType, LayerDiff>,
    /// States present in `to` but not `from`.
    pub added_states: Vec<String>,
    /// States present in `from` but not `to`.
    pub removed_states: Vec<String>,
    /// Whether the Merkle root changed between versions.
    pub merkle_root_changed: bool,
    /// Net change in total boundary count across all layers.
    pub total_boundary_delta: i64,
}

/// Error surface for snapshot persistence.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Underlying filesystem I/O failed.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A persisted document failed to parse.
    #[error("malformed snapshot document: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The requested version does not exist.
    #[error("snapshot version {0} not found")]
    NotFound(u64),
    /// `set_content_identifier` was called with a different cid than the one
    /// already set.
    #[error("content identifier already set to {existing}, cannot set to {attempted}")]
    ContentIdentifierConflict {
        /// The cid already recorded.
        existing: String,
        /// The cid the caller attempted to set.
        attempted: String,
    },
}

/// Storage seam for versioned snapshots and their proof templates.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// The latest (highest-version) snapshot, if any exist yet.
    async fn latest(&self) -> Result<Option<Snapshot>, SnapshotError>;

    /// A specific version.
    async fn get(&self, version: u64) -> Result<Option<Snapshot>, SnapshotError>;

    /// Build and persist a new snapshot from `boundaries`, assigning the
    /// next version and a fresh id. On a persistence failure, no partial
    /// state is left visible (the in-memory backend fails atomically by
    /// construction; the file backend removes its temp file on failure).
    async fn create_snapshot(
        &self,
        boundaries: &[Boundary],
        hasher: &dyn FieldHasher,
        metadata: SnapshotMetadata,
    ) -> Result<(Snapshot, MerkleTree), SnapshotError>;

    /// Set the content identifier, idempotent on the same value.
    async fn set_content_identifier(&self, version: u64, cid: String) -> Result<(), SnapshotError>;

    /// The stored proof template for one district under one snapshot
    /// version.
    async fn proof_template(&self, version: u64, boundary_id: &BoundaryId) -> Result<Option<ProofTemplate>, SnapshotError>;

    /// Compare two versions.
    async fn diff(&self, from: u64, to: u64) -> Result<Diff, SnapshotError> {
        let from_snap = self.get(from).await?.ok_or(SnapshotError::NotFound(from))?;
        let to_snap = self.get(to).await?.ok_or(SnapshotError::NotFound(to))?;
        Ok(diff_snapshots(&from_snap, &to_snap))
    }
}

fn diff_snapshots(from: &Snapshot, to: &Snapshot) -> Diff {
    let mut modified_layers = BTreeMap::new();
    let mut added_layers = Vec::new();
    let mut removed_layers = Vec::new();

    for (&layer, &to_count) in &to.layer_counts {
        match from.layer_counts.get(&layer) {
            Some(&from_count) => {
                if from_count != to_count {
                    modified_layers.insert(layer, LayerDiff { from_count, to_count, delta: to_count as i64 - from_count as i64 });
                }
            }
            None => added_layers.push(layer),
        }
    }
    for &layer in from.layer_counts.keys() {
        if !to.layer_counts.contains_key(&layer) {
            removed_layers.push(layer);
        }
    }

    let from_states: std::collections::BTreeSet<_> = from.metadata.states.iter().cloned().collect();
    let to_states: std::collections::BTreeSet<_> = to.metadata.states.iter().cloned().collect();
    let added_states = to_states.difference(&from_states).cloned().collect();
    let removed_states = from_states.difference(&to_states).cloned().collect();

    let from_total: usize = from.layer_counts.values().sum();
    let to_total: usize = to.layer_counts.values().sum();

    Diff {
        added_layers,
        removed_layers,
        modified_layers,
        added_states,
        removed_states,
        merkle_root_changed: from.merkle_root != to.merkle_root,
        total_boundary_delta: to_total as i64 - from_total as i64,
    }
}

fn build_tree_and_snapshot(
    boundaries: &[Boundary],
    hasher: &dyn FieldHasher,
    version: u64,
    previous_version: Option<u64>,
    mut metadata: SnapshotMetadata,
) -> (Snapshot, MerkleTree) {
    metadata.previous_version = previous_version;
    let leaves: Vec<_> = boundaries
        .iter()
        .map(|b| (b.id.clone(), leaf_for_boundary(hasher, &b.id, b.authority_level, DEFAULT_ACTION_DOMAIN)))
        .collect();
    let tree = MerkleTree::build(hasher, leaves);

    let mut layer_counts = BTreeMap::new();
    for b in boundaries {
        *layer_counts.entry(b.layer_type).or_insert(0) += 1;
    }

    let snapshot = Snapshot {
        id: SnapshotId::generate(),
        version,
        merkle_root: tree.root(),
        timestamp: Utc::now(),
        content_identifier: None,
        layer_counts,
        metadata,
    };
    (snapshot, tree)
}

/// In-memory [`SnapshotStore`], for tests and single-process use without a
/// filesystem.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    inner: parking_lot::RwLock<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    snapshots: BTreeMap<u64, Snapshot>,
    trees: BTreeMap<u64, MerkleTree>,
}

impl InMemorySnapshotStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn latest(&self) -> Result<Option<Snapshot>, SnapshotError> {
        Ok(self.inner.read().snapshots.values().last().cloned())
    }

    async fn get(&self, version: u64) -> Result<Option<Snapshot>, SnapshotError> {
        Ok(self.inner.read().snapshots.get(&version).cloned())
    }

    async fn create_snapshot(
        &self,
        boundaries: &[Boundary],
        hasher: &dyn FieldHasher,
        metadata: SnapshotMetadata,
    ) -> Result<(Snapshot, MerkleTree), SnapshotError> {
        let mut state = self.inner.write();
        let previous_version = state.snapshots.keys().last().copied();
        let version = previous_version.unwrap_or(0) + 1;
        let (snapshot, tree) = build_tree_and_snapshot(boundaries, hasher, version, previous_version, metadata);
        state.snapshots.insert(version, snapshot.clone());
        state.trees.insert(version, tree.clone());
        Ok((snapshot, tree))
    }

    async fn set_content_identifier(&self, version: u64, cid: String) -> Result<(), SnapshotError> {
        let mut state = self.inner.write();
        let snapshot = state.snapshots.get_mut(&version).ok_or(SnapshotError::NotFound(version))?;
        match &snapshot.content_identifier {
            Some(existing) if existing == &cid => Ok(()),
            Some(existing) => Err(SnapshotError::ContentIdentifierConflict { existing: existing.clone(), attempted: cid }),
            None => {
                snapshot.content_identifier = Some(cid);
                Ok(())
            }
        }
    }

    async fn proof_template(&self, version: u64, boundary_id: &BoundaryId) -> Result<Option<ProofTemplate>, SnapshotError> {
        let state = self.inner.read();
        let Some(tree) = state.trees.get(&version) else { return Ok(None) };
        Ok(tree.proof_for(boundary_id))
    }
}

/// Filesystem-backed [`SnapshotStore`]: one `snapshot-v<version>-<uuid>.json`
/// document per snapshot and one `proofs-<uuid>.json` document per
/// snapshot's proof templates, both written atomically (temp file, then
/// rename).
pub struct FileSnapshotStore {
    dir: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotDocument {
    id: SnapshotId,
    version: u64,
    #[serde(rename = "merkleRoot")]
    merkle_root: String,
    timestamp: DateTime<Utc>,
    #[serde(rename = "ipfsCid", skip_serializing_if = "Option::is_none")]
    ipfs_cid: Option<String>,
    #[serde(rename = "layerCounts")]
    layer_counts: BTreeMap<LayerType, usize>,
    metadata: SnapshotMetadata,
}

impl From<&Snapshot> for SnapshotDocument {
    fn from(s: &Snapshot) -> Self {
        Self {
            id: s.id,
            version: s.version,
            merkle_root: s.merkle_root.to_hex(),
            timestamp: s.timestamp,
            ipfs_cid: s.content_identifier.clone(),
            layer_counts: s.layer_counts.clone(),
            metadata: s.metadata.clone(),
        }
    }
}

impl SnapshotDocument {
    fn into_snapshot(self) -> Snapshot {
        Snapshot {
            id: self.id,
            version: self.version,
            merkle_root: crate::crypto::FieldElement::from_hex(&self.merkle_root).expect("persisted root is valid hex"),
            timestamp: self.timestamp,
            content_identifier: self.ipfs_cid,
            layer_counts: self.layer_counts,
            metadata: self.metadata,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ProofDocument {
    #[serde(rename = "merkleRoot")]
    merkle_root: String,
    #[serde(rename = "treeDepth")]
    tree_depth: usize,
    #[serde(rename = "templateCount")]
    template_count: usize,
    #[serde(rename = "generatedAt")]
    generated_at: DateTime<Utc>,
    templates: BTreeMap<String, ProofTemplate>,
}

impl FileSnapshotStore {
    /// Construct a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), lock: tokio::sync::Mutex::new(()) }
    }

    fn snapshot_path(&self, version: u64, id: SnapshotId) -> PathBuf {
        self.dir.join(format!("snapshot-v{version}-{}.json", id.as_uuid()))
    }

    fn proofs_path(&self, id: SnapshotId) -> PathBuf {
        self.dir.join(format!("proofs-{}.json", id.as_uuid()))
    }

    async fn write_atomic(&self, path: &std::path::Path, contents: &str) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn all_snapshot_files(&self) -> Result<Vec<PathBuf>, SnapshotError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("snapshot-v") && name.ends_with(".json") {
                paths.push(entry.path());
            }
        }
        Ok(paths)
    }

    async fn load_all(&self) -> Result<BTreeMap<u64, Snapshot>, SnapshotError> {
        let mut out = BTreeMap::new();
        for path in self.all_snapshot_files().await? {
            let contents = tokio::fs::read_to_string(&path).await?;
            let doc: SnapshotDocument = serde_json::from_str(&contents)?;
            out.insert(doc.version, doc.into_snapshot());
        }
        Ok(out)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn latest(&self) -> Result<Option<Snapshot>, SnapshotError> {
        Ok(self.load_all().await?.into_values().last())
    }

    async fn get(&self, version: u64) -> Result<Option<Snapshot>, SnapshotError> {
        Ok(self.load_all().await?.remove(&version))
    }

    async fn create_snapshot(
        &self,
        boundaries: &[Boundary],
        hasher: &dyn FieldHasher,
        metadata: SnapshotMetadata,
    ) -> Result<(Snapshot, MerkleTree), SnapshotError> {
        let _guard = self.lock.lock().await;
        let existing = self.load_all().await?;
        let previous_version = existing.keys().last().copied();
        let version = previous_version.unwrap_or(0) + 1;
        let (snapshot, tree) = build_tree_and_snapshot(boundaries, hasher, version, previous_version, metadata);

        let snapshot_path = self.snapshot_path(version, snapshot.id);
        let doc = SnapshotDocument::from(&snapshot);
        let contents = serde_json::to_string_pretty(&doc)?;
        if let Err(e) = self.write_atomic(&snapshot_path, &contents).await {
            let tmp = snapshot_path.with_extension("json.tmp");
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        let templates: BTreeMap<String, ProofTemplate> =
            tree.boundary_ids().map(|id| (id.as_str().to_string(), tree.proof_for(id).expect("id came from this tree"))).collect();
        let proof_doc = ProofDocument {
            merkle_root: tree.root().to_hex(),
            tree_depth: tree.depth(),
            template_count: templates.len(),
            generated_at: Utc::now(),
            templates,
        };
        let proofs_path = self.proofs_path(snapshot.id);
        let contents = serde_json::to_string_pretty(&proof_doc)?;
        self.write_atomic(&proofs_path, &contents).await?;

        Ok((snapshot, tree))
    }

    async fn set_content_identifier(&self, version: u64, cid: String) -> Result<(), SnapshotError> {
        let _guard = self.lock.lock().await;
        let mut snapshot = self.get(version).await?.ok_or(SnapshotError::NotFound(version))?;
        match &snapshot.content_identifier {
            Some(existing) if existing == &cid => return Ok(()),
            Some(existing) => return Err(SnapshotError::ContentIdentifierConflict { existing: existing.clone(), attempted: cid }),
            None => snapshot.content_identifier = Some(cid),
        }
        let path = self.snapshot_path(version, snapshot.id);
        let doc = SnapshotDocument::from(&snapshot);
        let contents = serde_json::to_string_pretty(&doc)?;
        self.write_atomic(&path, &contents).await
    }

    async fn proof_template(&self, version: u64, boundary_id: &BoundaryId) -> Result<Option<ProofTemplate>, SnapshotError> {
        let Some(snapshot) = self.get(version).await? else { return Ok(None) };
        let path = self.proofs_path(snapshot.id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = tokio::fs::read_to_string(&path).await?;
        let doc: ProofDocument = serde_json::from_str(&contents)?;
        Ok(doc.templates.get(boundary_id.as_str()).cloned())
    }
}
