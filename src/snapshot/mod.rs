//! Snapshot and Merkle Commitment: canonical leaf hashing, deterministic
//! tree construction, versioned snapshots with proof templates, and diff
//! between versions.

pub mod tree;
pub mod store;

pub use tree::{MerkleTree, ProofTemplate, leaf_for_boundary};
pub use store::{
    Diff, FileSnapshotStore, InMemorySnapshotStore, LayerDiff, Snapshot, SnapshotError,
    SnapshotMetadata, SnapshotStore,
};
