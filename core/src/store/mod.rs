//! store/mod.rs
//! Durable persistence contracts for chunk payloads and session metadata.
//!
//! Design notes:
//! - `ChunkStore` records are write-once: a retried `put` with identical
//!   bytes is a no-op success; different bytes for an existing key is a
//!   conflict. Idempotence is what makes the chunker's retry loop safe.
//! - Replication and durability guarantees belong to the backend. The
//!   pipeline requires only read-your-writes after a successful put.
//! - `MetadataStore` mirrors a document store: atomic single-record upsert
//!   keyed by session id (+ sequence number for chunk records).

pub mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunk::ChunkRecord;
use crate::session::manifest::Manifest;
use crate::session::record::SessionRecord;

pub use memory::{MemoryChunkStore, MemoryMetadataStore};

/// Opaque locator for one stored chunk payload (composite key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageRef {
    pub session_id: Uuid,
    pub sequence_number: u64,
}

impl fmt::Display for StorageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:08}", self.session_id, self.sequence_number)
    }
}

#[derive(Debug)]
pub enum StoreError {
    /// Write-once violation: key exists with different bytes.
    WriteConflict { session_id: Uuid, sequence_number: u64 },

    /// No record under the given reference.
    NotFound { reference: String },

    /// Backend unreachable or failing; retriable by the caller.
    Unavailable(String),

    /// Record (de)serialization failure.
    Serialization(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use StoreError::*;
        match self {
            WriteConflict { session_id, sequence_number } =>
                write!(f, "write conflict: {}/{} already stored with different bytes",
                       session_id, sequence_number),
            NotFound { reference } =>
                write!(f, "not found: {}", reference),
            Unavailable(msg) =>
                write!(f, "store unavailable: {}", msg),
            Serialization(msg) =>
                write!(f, "store serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Durable chunk payload storage.
pub trait ChunkStore: Send + Sync {
    /// Persist one stored chunk payload. Idempotent by
    /// `(session_id, sequence_number)`; see module notes.
    fn put(
        &self,
        session_id: Uuid,
        sequence_number: u64,
        stored_bytes: &[u8],
    ) -> Result<StorageRef, StoreError>;

    /// Fetch a stored payload by reference.
    fn get(&self, storage_ref: &StorageRef) -> Result<Vec<u8>, StoreError>;
}

/// Document-style metadata persistence for sessions, chunk index entries,
/// and manifests.
pub trait MetadataStore: Send + Sync {
    /// Atomic upsert of the session record.
    fn upsert_session(&self, record: &SessionRecord) -> Result<(), StoreError>;

    fn load_session(&self, session_id: Uuid) -> Result<Option<SessionRecord>, StoreError>;

    /// Persist one chunk index record (write-once, idempotent like
    /// `ChunkStore::put`).
    fn put_chunk_record(&self, record: &ChunkRecord) -> Result<(), StoreError>;

    /// All chunk records for a session in sequence order.
    fn chunk_records(&self, session_id: Uuid) -> Result<Vec<ChunkRecord>, StoreError>;

    /// Persist the manifest (write-once, idempotent on identical content).
    fn put_manifest(&self, manifest: &Manifest) -> Result<(), StoreError>;

    fn load_manifest(&self, session_id: Uuid) -> Result<Option<Manifest>, StoreError>;
}
