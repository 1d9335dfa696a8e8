//! Canonical leaf encoding and deterministic Merkle tree construction.

use crate::crypto::{FieldElement, FieldHasher};
use crate::ids::{AuthorityLevel, BoundaryId};

/// Public constant scoping every leaf to one use (e.g. a specific election),
/// binding leaves without revealing any client secret. A production
/// deployment would source this from the election/ballot configuration
/// rather than hardcoding it; kept as a plain constant here since the
/// action domain is treated as an opaque public string.
pub const DEFAULT_ACTION_DOMAIN: &str = "boundary-kernel/v1";

/// Compute a district's committed leaf: `hash_four(poseidon(district_id),
/// poseidon(authority_level), poseidon(action_domain), 0)`. No user secret
/// or registration salt is ever folded in; those stay client-side so a
/// client can prove membership without revealing anything beyond the
/// district itself.
pub fn leaf_for_boundary(
    hasher: &dyn FieldHasher,
    id: &BoundaryId,
    authority_level: AuthorityLevel,
    action_domain: &str,
) -> FieldElement {
    let id_fe = hash_identifier(hasher, id.as_str());
    let level_fe = FieldElement::from_u64(authority_level.value() as u64);
    let domain_fe = hash_identifier(hasher, action_domain);
    hasher.hash_four(id_fe, level_fe, domain_fe, FieldElement::ZERO)
}

/// Hash an identifier string of arbitrary length into one field element:
/// strings within the single-element budget go straight through
/// `hash_string`; longer ones are chunked and folded so a long boundary id
/// or jurisdiction path never panics the encoder.
fn hash_identifier(hasher: &dyn FieldHasher, value: &str) -> FieldElement {
    const CHUNK: usize = 31;
    let bytes = value.as_bytes();
    if bytes.len() <= CHUNK {
        return hasher.hash_string(value).expect("checked length <= 31");
    }
    let mut acc = FieldElement::ZERO;
    for chunk in bytes.chunks(CHUNK) {
        let piece = std::str::from_utf8(chunk).unwrap_or("");
        let piece_fe = hasher.hash_string(piece).unwrap_or(FieldElement::ZERO);
        acc = hasher.hash_pair(acc, piece_fe);
    }
    acc
}

/// A Merkle inclusion proof: the ordered siblings and path indices needed to
/// replay a leaf up to the root, plus the leaf hash itself.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProofTemplate {
    /// The district's leaf hash.
    pub leaf_hash: FieldElement,
    /// Sibling hashes ordered leaf-to-root.
    pub siblings: Vec<FieldElement>,
    /// Path indices ordered leaf-to-root: 0 means this node is the left
    /// child at that level, 1 means it is the right child.
    pub path_indices: Vec<u8>,
}

impl ProofTemplate {
    /// Replay this proof against `root`, returning whether it verifies.
    pub fn verify(&self, hasher: &dyn FieldHasher, root: FieldElement) -> bool {
        let mut current = self.leaf_hash;
        for (sibling, index) in self.siblings.iter().zip(self.path_indices.iter()) {
            current = match index {
                0 => hasher.hash_pair(current, *sibling),
                _ => hasher.hash_pair(*sibling, current),
            };
        }
        current == root
    }
}

/// A deterministic, bottom-up binary Merkle tree over zero-padded leaves,
/// stored level-by-level so proof generation is O(log N) per leaf.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<FieldElement>>,
    /// Boundary ids in the order their (possibly padded) leaf appears,
    /// sorted ascending; padding leaves have no id.
    leaf_ids: Vec<Option<BoundaryId>>,
}

impl MerkleTree {
    /// Build a tree from `(BoundaryId, leaf)` pairs, sorting by id ascending
    /// and padding with zero leaves to the next power of two.
    pub fn build(hasher: &dyn FieldHasher, mut leaves: Vec<(BoundaryId, FieldElement)>) -> Self {
        leaves.sort_by(|a, b| a.0.cmp(&b.0));
        let mut leaf_ids: Vec<Option<BoundaryId>> = leaves.iter().map(|(id, _)| Some(id.clone())).collect();
        let mut level: Vec<FieldElement> = leaves.into_iter().map(|(_, leaf)| leaf).collect();

        let target_len = next_power_of_two(level.len().max(1));
        while level.len() < target_len {
            level.push(FieldElement::ZERO);
            leaf_ids.push(None);
        }

        let mut levels = vec![level.clone()];
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len() / 2);
            for pair in level.chunks(2) {
                next.push(hasher.hash_pair(pair[0], pair[1]));
            }
            levels.push(next.clone());
            level = next;
        }

        Self { levels, leaf_ids }
    }

    /// The tree's root hash. A single-leaf tree's root is that leaf itself.
    pub fn root(&self) -> FieldElement {
        *self.levels.last().expect("at least one level always present").first().expect("root level is non-empty")
    }

    /// Depth of the tree (number of levels above the leaves, i.e.
    /// `log2(leaf_count)`).
    pub fn depth(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Total (padded) leaf count.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Build an inclusion proof for the leaf at `index` (0-based, into the
    /// padded leaf array).
    pub fn proof_at(&self, index: usize) -> ProofTemplate {
        let leaf_hash = self.levels[0][index];
        let mut siblings = Vec::with_capacity(self.depth());
        let mut path_indices = Vec::with_capacity(self.depth());
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let is_right = idx % 2 == 1;
            let sibling_idx = if is_right { idx - 1 } else { idx + 1 };
            siblings.push(level[sibling_idx]);
            path_indices.push(if is_right { 1 } else { 0 });
            idx /= 2;
        }
        ProofTemplate { leaf_hash, siblings, path_indices }
    }

    /// Build an inclusion proof for a specific boundary id, if it is a
    /// (non-padding) leaf of this tree.
    pub fn proof_for(&self, id: &BoundaryId) -> Option<ProofTemplate> {
        let index = self.leaf_ids.iter().position(|slot| slot.as_ref() == Some(id))?;
        Some(self.proof_at(index))
    }

    /// Every non-padding leaf's boundary id, in tree order.
    pub fn boundary_ids(&self) -> impl Iterator<Item = &BoundaryId> {
        self.leaf_ids.iter().filter_map(|slot| slot.as_ref())
    }
}

fn next_power_of_two(n: usize) -> usize {
    n.next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PoseidonBn254Hasher;

    fn id(s: &str) -> BoundaryId {
        BoundaryId::new(s)
    }

    #[test]
    fn single_leaf_tree_root_is_the_leaf_itself() {
        let hasher = PoseidonBn254Hasher::new();
        let leaf = leaf_for_boundary(&hasher, &id("district-1"), AuthorityLevel::new(3).unwrap(), DEFAULT_ACTION_DOMAIN);
        let tree = MerkleTree::build(&hasher, vec![(id("district-1"), leaf)]);
        assert_eq!(tree.root(), leaf);
    }

    #[test]
    fn every_proof_replays_to_the_root() {
        let hasher = PoseidonBn254Hasher::new();
        let leaves: Vec<_> = (0..5)
            .map(|i| {
                let bid = id(&format!("district-{i}"));
                let leaf = leaf_for_boundary(&hasher, &bid, AuthorityLevel::new(2).unwrap(), DEFAULT_ACTION_DOMAIN);
                (bid, leaf)
            })
            .collect();
        let tree = MerkleTree::build(&hasher, leaves.clone());
        assert_eq!(tree.leaf_count(), 8, "5 leaves pad to the next power of two");
        for (bid, _) in &leaves {
            let proof = tree.proof_for(bid).expect("leaf present");
            assert!(proof.verify(&hasher, tree.root()));
        }
    }

    #[test]
    fn mutating_a_sibling_invalidates_the_proof() {
        let hasher = PoseidonBn254Hasher::new();
        let leaves: Vec<_> = (0..4)
            .map(|i| {
                let bid = id(&format!("district-{i}"));
                let leaf = leaf_for_boundary(&hasher, &bid, AuthorityLevel::new(2).unwrap(), DEFAULT_ACTION_DOMAIN);
                (bid, leaf)
            })
            .collect();
        let tree = MerkleTree::build(&hasher, leaves.clone());
        let mut proof = tree.proof_for(&leaves[0].0).unwrap();
        assert!(proof.verify(&hasher, tree.root()));
        proof.siblings[0] = FieldElement::from_u64(999);
        assert!(!proof.verify(&hasher, tree.root()));
    }

    #[test]
    fn leaf_ordering_is_by_boundary_id_ascending_regardless_of_input_order() {
        let hasher = PoseidonBn254Hasher::new();
        let leaf_b = leaf_for_boundary(&hasher, &id("b"), AuthorityLevel::new(1).unwrap(), DEFAULT_ACTION_DOMAIN);
        let leaf_a = leaf_for_boundary(&hasher, &id("a"), AuthorityLevel::new(1).unwrap(), DEFAULT_ACTION_DOMAIN);
        let tree_1 = MerkleTree::build(&hasher, vec![(id("b"), leaf_b), (id("a"), leaf_a)]);
        let tree_2 = MerkleTree::build(&hasher, vec![(id("a"), leaf_a), (id("b"), leaf_b)]);
        assert_eq!(tree_1.root(), tree_2.root());
    }

    #[test]
    fn leaf_encoding_never_hashes_a_user_secret() {
        // The function signature itself has no secret/salt parameter; this
        // test documents that guarantee so a future edit adding one would
        // have to change this test too.
        let hasher = PoseidonBn254Hasher::new();
        let a = leaf_for_boundary(&hasher, &id("district-1"), AuthorityLevel::new(3).unwrap(), DEFAULT_ACTION_DOMAIN);
        let b = leaf_for_boundary(&hasher, &id("district-1"), AuthorityLevel::new(3).unwrap(), DEFAULT_ACTION_DOMAIN);
        assert_eq!(a, b, "leaf is a pure function of public attributes only");
    }
}
