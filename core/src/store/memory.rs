//! store/memory.rs
//! In-process reference implementations of the storage contracts.
//!
//! Used by the pipeline tests and as the semantic reference for external
//! backend adapters. Mutex-protected maps; every operation is atomic and
//! read-your-writes by construction.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use uuid::Uuid;

use crate::chunk::ChunkRecord;
use crate::session::manifest::Manifest;
use crate::session::record::SessionRecord;
use crate::store::{ChunkStore, MetadataStore, StorageRef, StoreError};

#[derive(Default)]
pub struct MemoryChunkStore {
    chunks: Mutex<HashMap<(Uuid, u64), Vec<u8>>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChunkStore for MemoryChunkStore {
    fn put(
        &self,
        session_id: Uuid,
        sequence_number: u64,
        stored_bytes: &[u8],
    ) -> Result<StorageRef, StoreError> {
        let mut chunks = self.chunks.lock().unwrap();
        let key = (session_id, sequence_number);

        if let Some(existing) = chunks.get(&key) {
            if existing.as_slice() != stored_bytes {
                return Err(StoreError::WriteConflict { session_id, sequence_number });
            }
            // Retried put with identical bytes: no-op success.
        } else {
            chunks.insert(key, stored_bytes.to_vec());
        }

        Ok(StorageRef { session_id, sequence_number })
    }

    fn get(&self, storage_ref: &StorageRef) -> Result<Vec<u8>, StoreError> {
        let chunks = self.chunks.lock().unwrap();
        chunks
            .get(&(storage_ref.session_id, storage_ref.sequence_number))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                reference: storage_ref.to_string(),
            })
    }
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    sessions: Mutex<HashMap<Uuid, SessionRecord>>,
    chunks: Mutex<BTreeMap<(Uuid, u64), ChunkRecord>>,
    manifests: Mutex<HashMap<Uuid, Manifest>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn upsert_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.sessions
            .lock()
            .unwrap()
            .insert(record.session_id, record.clone());
        Ok(())
    }

    fn load_session(&self, session_id: Uuid) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.sessions.lock().unwrap().get(&session_id).cloned())
    }

    fn put_chunk_record(&self, record: &ChunkRecord) -> Result<(), StoreError> {
        let mut chunks = self.chunks.lock().unwrap();
        let key = (record.session_id, record.sequence_number);

        if let Some(existing) = chunks.get(&key) {
            if existing != record {
                return Err(StoreError::WriteConflict {
                    session_id: record.session_id,
                    sequence_number: record.sequence_number,
                });
            }
        } else {
            chunks.insert(key, record.clone());
        }
        Ok(())
    }

    fn chunk_records(&self, session_id: Uuid) -> Result<Vec<ChunkRecord>, StoreError> {
        let chunks = self.chunks.lock().unwrap();
        // BTreeMap keys iterate in (session, sequence) order.
        Ok(chunks
            .range((session_id, 0)..=(session_id, u64::MAX))
            .map(|(_, rec)| rec.clone())
            .collect())
    }

    fn put_manifest(&self, manifest: &Manifest) -> Result<(), StoreError> {
        let mut manifests = self.manifests.lock().unwrap();

        if let Some(existing) = manifests.get(&manifest.session_id) {
            if existing != manifest {
                return Err(StoreError::WriteConflict {
                    session_id: manifest.session_id,
                    sequence_number: 0,
                });
            }
        } else {
            manifests.insert(manifest.session_id, manifest.clone());
        }
        Ok(())
    }

    fn load_manifest(&self, session_id: Uuid) -> Result<Option<Manifest>, StoreError> {
        Ok(self.manifests.lock().unwrap().get(&session_id).cloned())
    }
}
