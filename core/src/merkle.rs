//! Binary Merkle tree over an ordered sequence of chunk content hashes.
//!
//! Design notes:
//! - Append-only: leaves arrive one at a time as chunks commit; the root
//!   is computed lazily at finalization (append O(1), root O(n)).
//! - Leaf order is significant: the root is a function of the ordered
//!   leaf sequence, not the leaf multiset.
//! - Odd levels duplicate their last node (duplicate-last rule), applied
//!   identically on construction and verification. A level of size one is
//!   the root, so a single-leaf tree's root is the leaf itself.

use serde::{Deserialize, Serialize};

use crate::chunk::record::serde_bytes_hash;
use crate::crypto::digest::{hash_pair_32, ContentHash, HashAlg};

#[derive(Debug)]
pub enum MerkleError {
    /// Root or proof requested over zero leaves.
    EmptyTree,

    /// Proof requested for a leaf index past the end.
    LeafOutOfRange { index: u64, len: u64 },
}

impl std::fmt::Display for MerkleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MerkleError::EmptyTree =>
                write!(f, "merkle tree has no leaves"),
            MerkleError::LeafOutOfRange { index, len } =>
                write!(f, "leaf index {} out of range for {} leaves", index, len),
        }
    }
}

impl std::error::Error for MerkleError {}

/// One sibling hash on the path from a leaf to the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofStep {
    #[serde(with = "serde_bytes_hash")]
    pub sibling: ContentHash,
    /// True when the sibling sits to the right of the running hash.
    pub sibling_on_right: bool,
}

/// Inclusion proof for one leaf: sibling hashes from leaf level to root.
/// A verifier holding only the root and the chunk's raw bytes can confirm
/// membership without fetching any other chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InclusionProof {
    pub leaf_index: u64,
    pub steps: Vec<ProofStep>,
}

/// Incremental Merkle tree builder.
#[derive(Debug, Clone)]
pub struct MerkleTreeBuilder {
    alg: HashAlg,
    leaves: Vec<ContentHash>,
}

impl MerkleTreeBuilder {
    pub fn new(alg: HashAlg) -> Self {
        Self { alg, leaves: Vec::new() }
    }

    pub fn alg(&self) -> HashAlg {
        self.alg
    }

    /// Append the next leaf in commit order.
    pub fn append(&mut self, leaf: ContentHash) {
        self.leaves.push(leaf);
    }

    pub fn len(&self) -> u64 {
        self.leaves.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn leaves(&self) -> &[ContentHash] {
        &self.leaves
    }

    /// Compute the root over all appended leaves.
    pub fn root(&self) -> Result<ContentHash, MerkleError> {
        compute_root(self.alg, &self.leaves)
    }

    /// Build the inclusion proof for one leaf index.
    pub fn proof(&self, leaf_index: u64) -> Result<InclusionProof, MerkleError> {
        if self.leaves.is_empty() {
            return Err(MerkleError::EmptyTree);
        }
        if leaf_index >= self.len() {
            return Err(MerkleError::LeafOutOfRange {
                index: leaf_index,
                len: self.len(),
            });
        }

        let mut steps = Vec::new();
        let mut level = self.leaves.clone();
        let mut index = leaf_index as usize;

        while level.len() > 1 {
            let sibling_index = index ^ 1;
            let sibling = if sibling_index < level.len() {
                level[sibling_index]
            } else {
                // Odd level: the last node pairs with itself.
                level[index]
            };
            steps.push(ProofStep {
                sibling,
                sibling_on_right: index % 2 == 0,
            });

            level = next_level(self.alg, &level);
            index /= 2;
        }

        Ok(InclusionProof { leaf_index, steps })
    }
}

/// Hash one level into its parent level, duplicating the last node when
/// the level has an odd count.
fn next_level(alg: HashAlg, level: &[ContentHash]) -> Vec<ContentHash> {
    let mut parents = Vec::with_capacity(level.len().div_ceil(2));
    for pair in level.chunks(2) {
        let left = &pair[0];
        let right = pair.get(1).unwrap_or(left);
        parents.push(hash_pair_32(alg, left, right));
    }
    parents
}

/// Compute the root of an ordered, non-empty leaf sequence.
pub fn compute_root(alg: HashAlg, leaves: &[ContentHash]) -> Result<ContentHash, MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::EmptyTree);
    }

    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(alg, &level);
    }
    Ok(level[0])
}

/// Verify an inclusion proof against a root, holding only the leaf hash.
pub fn verify_inclusion(
    alg: HashAlg,
    root: &ContentHash,
    leaf: &ContentHash,
    proof: &InclusionProof,
) -> bool {
    let mut acc = *leaf;
    for step in &proof.steps {
        acc = if step.sibling_on_right {
            hash_pair_32(alg, &acc, &step.sibling)
        } else {
            hash_pair_32(alg, &step.sibling, &acc)
        };
    }
    acc == *root
}
