use std::sync::atomic::{AtomicU32, Ordering};

use capture_core::chunk::ChunkRecord;
use capture_core::crypto::digest::{content_hash_32, HashAlg};
use capture_core::merkle::MerkleTreeBuilder;
use capture_core::session::manifest::{ManifestError, SessionManifestWriter, EMPTY_SESSION_ROOT};
use capture_core::session::SessionRecord;
use capture_core::store::{MemoryMetadataStore, MetadataStore, StorageRef, StoreError};
use capture_core::session::Manifest;
use chrono::Utc;
use uuid::Uuid;

const ALG: HashAlg = HashAlg::Sha256;

/// Delegating store that counts manifest writes.
struct CountingMetaStore {
    inner: MemoryMetadataStore,
    manifest_writes: AtomicU32,
}

impl CountingMetaStore {
    fn new() -> Self {
        Self {
            inner: MemoryMetadataStore::new(),
            manifest_writes: AtomicU32::new(0),
        }
    }
}

impl MetadataStore for CountingMetaStore {
    fn upsert_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.inner.upsert_session(record)
    }

    fn load_session(&self, session_id: Uuid) -> Result<Option<SessionRecord>, StoreError> {
        self.inner.load_session(session_id)
    }

    fn put_chunk_record(&self, record: &ChunkRecord) -> Result<(), StoreError> {
        self.inner.put_chunk_record(record)
    }

    fn chunk_records(&self, session_id: Uuid) -> Result<Vec<ChunkRecord>, StoreError> {
        self.inner.chunk_records(session_id)
    }

    fn put_manifest(&self, manifest: &Manifest) -> Result<(), StoreError> {
        self.manifest_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put_manifest(manifest)
    }

    fn load_manifest(&self, session_id: Uuid) -> Result<Option<Manifest>, StoreError> {
        self.inner.load_manifest(session_id)
    }
}

fn seed_chunks(
    meta: &dyn MetadataStore,
    session_id: Uuid,
    count: u64,
) -> MerkleTreeBuilder {
    let mut tree = MerkleTreeBuilder::new(ALG);
    for sequence_number in 0..count {
        let content_hash = content_hash_32(ALG, &[sequence_number as u8]);
        tree.append(content_hash);
        meta.put_chunk_record(&ChunkRecord {
            session_id,
            sequence_number,
            raw_size: 1000,
            stored_size: 600,
            content_hash,
            storage_ref: StorageRef { session_id, sequence_number },
        })
        .unwrap();
    }
    tree
}

#[test]
fn finalize_builds_manifest_from_chunk_records() {
    let meta = CountingMetaStore::new();
    let session_id = Uuid::new_v4();
    let tree = seed_chunks(&meta, session_id, 3);

    let writer = SessionManifestWriter::new(&meta);
    let manifest = writer.finalize(session_id, &tree, Utc::now()).unwrap();

    assert_eq!(manifest.session_id, session_id);
    assert_eq!(manifest.chunk_count, 3);
    assert_eq!(manifest.total_raw_bytes, 3000);
    assert_eq!(manifest.merkle_root, tree.root().unwrap());
    assert_eq!(manifest.content_hash_alg, ALG);

    let sequences: Vec<_> = manifest
        .chunk_index
        .iter()
        .map(|e| e.sequence_number)
        .collect();
    assert_eq!(sequences, vec![0, 1, 2]);
}

#[test]
fn finalize_is_idempotent_and_writes_once() {
    let meta = CountingMetaStore::new();
    let session_id = Uuid::new_v4();
    let tree = seed_chunks(&meta, session_id, 4);

    let writer = SessionManifestWriter::new(&meta);
    let first = writer.finalize(session_id, &tree, Utc::now()).unwrap();
    let second = writer.finalize(session_id, &tree, Utc::now()).unwrap();

    // Bit-identical result, exactly one write.
    assert_eq!(first, second);
    assert_eq!(meta.manifest_writes.load(Ordering::SeqCst), 1);

    // Serialized forms agree too.
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[test]
fn empty_session_finalizes_with_sentinel_root() {
    let meta = CountingMetaStore::new();
    let session_id = Uuid::new_v4();
    let tree = MerkleTreeBuilder::new(ALG);

    let writer = SessionManifestWriter::new(&meta);
    let manifest = writer.finalize(session_id, &tree, Utc::now()).unwrap();

    assert_eq!(manifest.chunk_count, 0);
    assert_eq!(manifest.merkle_root, EMPTY_SESSION_ROOT);
    assert!(manifest.chunk_index.is_empty());
}

#[test]
fn finalize_rejects_gap_in_sequence() {
    let meta = MemoryMetadataStore::new();
    let session_id = Uuid::new_v4();

    let mut tree = MerkleTreeBuilder::new(ALG);
    for sequence_number in [0u64, 2u64] {
        let content_hash = content_hash_32(ALG, &[sequence_number as u8]);
        tree.append(content_hash);
        meta.put_chunk_record(&ChunkRecord {
            session_id,
            sequence_number,
            raw_size: 10,
            stored_size: 10,
            content_hash,
            storage_ref: StorageRef { session_id, sequence_number },
        })
        .unwrap();
    }

    let writer = SessionManifestWriter::new(&meta);
    assert!(matches!(
        writer.finalize(session_id, &tree, Utc::now()),
        Err(ManifestError::NonContiguous { expected: 1, found: 2 })
    ));
}

#[test]
fn finalize_rejects_leaf_count_mismatch() {
    let meta = MemoryMetadataStore::new();
    let session_id = Uuid::new_v4();
    let mut tree = seed_chunks(&meta, session_id, 2);
    // One extra leaf the store never saw.
    tree.append(content_hash_32(ALG, b"phantom"));

    let writer = SessionManifestWriter::new(&meta);
    assert!(matches!(
        writer.finalize(session_id, &tree, Utc::now()),
        Err(ManifestError::CountMismatch { records: 2, leaves: 3 })
    ));
}

#[test]
fn anchor_receipt_summarizes_manifest() {
    let meta = MemoryMetadataStore::new();
    let session_id = Uuid::new_v4();
    let tree = seed_chunks(&meta, session_id, 5);

    let writer = SessionManifestWriter::new(&meta);
    let manifest = writer.finalize(session_id, &tree, Utc::now()).unwrap();
    let receipt = manifest.anchor_receipt();

    assert_eq!(receipt.session_id, manifest.session_id);
    assert_eq!(receipt.merkle_root, manifest.merkle_root);
    assert_eq!(receipt.chunk_count, manifest.chunk_count);
    assert_eq!(receipt.finalized_at, manifest.finalized_at);
}

#[test]
fn manifest_json_roundtrip() {
    let meta = MemoryMetadataStore::new();
    let session_id = Uuid::new_v4();
    let tree = seed_chunks(&meta, session_id, 2);

    let writer = SessionManifestWriter::new(&meta);
    let manifest = writer.finalize(session_id, &tree, Utc::now()).unwrap();

    let json = manifest.to_json().unwrap();
    let parsed: Manifest = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, manifest);
}
