//! session/manifest.rs
//! Idempotent manifest finalization.
//!
//! A manifest is written at most once per session. Re-finalizing returns
//! the stored manifest bit-identically and performs no new writes; the
//! already-finalized condition is not an error to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::chunk::record::serde_bytes_hash;
use crate::crypto::digest::{ContentHash, HashAlg};
use crate::external::AnchorReceipt;
use crate::merkle::{MerkleError, MerkleTreeBuilder};
use crate::store::{MetadataStore, StorageRef, StoreError};

/// Documented sentinel root for a session finalized with zero chunks.
/// The Merkle builder itself rejects empty root computation, so the
/// zero-chunk case is explicit here rather than implicit in tree code.
pub const EMPTY_SESSION_ROOT: ContentHash = [0u8; 32];

/// One entry of the manifest's ordered chunk index: enough to re-fetch
/// and re-verify every chunk independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkIndexEntry {
    pub sequence_number: u64,
    #[serde(with = "serde_bytes_hash")]
    pub content_hash: ContentHash,
    pub storage_ref: StorageRef,
}

/// The finalized, externally-anchorable summary of a session. Never
/// mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub session_id: Uuid,
    #[serde(with = "serde_bytes_hash")]
    pub merkle_root: ContentHash,
    /// Algorithm for leaves and interior nodes; verifiers need it to
    /// reconstruct the tree from `chunk_index`.
    pub content_hash_alg: HashAlg,
    pub chunk_count: u64,
    pub total_raw_bytes: u64,
    pub finalized_at: DateTime<Utc>,
    pub chunk_index: Vec<ChunkIndexEntry>,
}

impl Manifest {
    /// The compact record handed to the anchoring collaborator.
    pub fn anchor_receipt(&self) -> AnchorReceipt {
        AnchorReceipt {
            session_id: self.session_id,
            merkle_root: self.merkle_root,
            chunk_count: self.chunk_count,
            finalized_at: self.finalized_at,
        }
    }

    pub fn to_json(&self) -> Result<String, ManifestError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ManifestError::Serialization(e.to_string()))
    }
}

#[derive(Debug)]
pub enum ManifestError {
    /// Chunk index records are not contiguous from 0.
    NonContiguous { expected: u64, found: u64 },

    /// Stored chunk records disagree with the Merkle builder's leaves.
    LeafMismatch { sequence_number: u64 },

    /// Chunk record count differs from the accumulated leaf count.
    CountMismatch { records: u64, leaves: u64 },

    Merkle(MerkleError),
    Store(StoreError),
    Serialization(String),
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ManifestError::*;
        match self {
            NonContiguous { expected, found } =>
                write!(f, "chunk index not contiguous: expected {}, found {}", expected, found),
            LeafMismatch { sequence_number } =>
                write!(f, "chunk {} hash disagrees with merkle leaf", sequence_number),
            CountMismatch { records, leaves } =>
                write!(f, "chunk record count {} != leaf count {}", records, leaves),
            Merkle(e) => write!(f, "merkle error: {}", e),
            Store(e) => write!(f, "store error: {}", e),
            Serialization(msg) => write!(f, "manifest serialization error: {}", msg),
        }
    }
}

impl std::error::Error for ManifestError {}

impl From<MerkleError> for ManifestError {
    fn from(e: MerkleError) -> Self {
        ManifestError::Merkle(e)
    }
}

impl From<StoreError> for ManifestError {
    fn from(e: StoreError) -> Self {
        ManifestError::Store(e)
    }
}

/// Finalizes a session: assembles the chunk index, computes the Merkle
/// root, and writes the immutable manifest record.
pub struct SessionManifestWriter<'a> {
    meta_store: &'a dyn MetadataStore,
}

impl<'a> SessionManifestWriter<'a> {
    pub fn new(meta_store: &'a dyn MetadataStore) -> Self {
        Self { meta_store }
    }

    /// Finalize the session, idempotently.
    ///
    /// Consistency checks before the write: sequence numbers contiguous
    /// from 0, record count equal to the accumulated leaf count, and each
    /// record's content hash equal to its Merkle leaf. Finalization
    /// happens-after every chunk commit it references; the caller
    /// guarantees the chunker has stopped.
    pub fn finalize(
        &self,
        session_id: Uuid,
        tree: &MerkleTreeBuilder,
        finalized_at: DateTime<Utc>,
    ) -> Result<Manifest, ManifestError> {
        // Re-finalization returns the stored manifest, no new writes.
        if let Some(existing) = self.meta_store.load_manifest(session_id)? {
            debug!(session = %session_id, "manifest already finalized");
            return Ok(existing);
        }

        let records = self.meta_store.chunk_records(session_id)?;

        if records.len() as u64 != tree.len() {
            return Err(ManifestError::CountMismatch {
                records: records.len() as u64,
                leaves: tree.len(),
            });
        }

        let mut chunk_index = Vec::with_capacity(records.len());
        let mut total_raw_bytes = 0u64;
        for (i, record) in records.iter().enumerate() {
            if record.sequence_number != i as u64 {
                return Err(ManifestError::NonContiguous {
                    expected: i as u64,
                    found: record.sequence_number,
                });
            }
            if tree.leaves()[i] != record.content_hash {
                return Err(ManifestError::LeafMismatch {
                    sequence_number: record.sequence_number,
                });
            }
            total_raw_bytes += record.raw_size;
            chunk_index.push(ChunkIndexEntry {
                sequence_number: record.sequence_number,
                content_hash: record.content_hash,
                storage_ref: record.storage_ref,
            });
        }

        let merkle_root = if tree.is_empty() {
            EMPTY_SESSION_ROOT
        } else {
            tree.root()?
        };

        let manifest = Manifest {
            session_id,
            merkle_root,
            content_hash_alg: tree.alg(),
            chunk_count: records.len() as u64,
            total_raw_bytes,
            finalized_at,
            chunk_index,
        };

        match self.meta_store.put_manifest(&manifest) {
            Ok(()) => Ok(manifest),
            // A concurrent finalizer won the write: theirs is canonical.
            Err(StoreError::WriteConflict { .. }) => {
                let existing = self.meta_store.load_manifest(session_id)?;
                existing.ok_or(ManifestError::Store(StoreError::NotFound {
                    reference: session_id.to_string(),
                }))
            }
            Err(e) => Err(ManifestError::Store(e)),
        }
    }
}
