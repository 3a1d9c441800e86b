use capture_core::chunk::ChunkRecord;
use capture_core::store::{
    ChunkStore, MemoryChunkStore, MemoryMetadataStore, MetadataStore, StorageRef, StoreError,
};
use uuid::Uuid;

fn chunk_record(session_id: Uuid, sequence_number: u64) -> ChunkRecord {
    ChunkRecord {
        session_id,
        sequence_number,
        raw_size: 1024,
        stored_size: 512,
        content_hash: [sequence_number as u8; 32],
        storage_ref: StorageRef { session_id, sequence_number },
    }
}

#[test]
fn put_then_get_roundtrips() {
    let store = MemoryChunkStore::new();
    let session = Uuid::new_v4();

    let storage_ref = store.put(session, 0, b"stored bytes").unwrap();
    assert_eq!(store.get(&storage_ref).unwrap(), b"stored bytes");
}

#[test]
fn retried_put_with_same_bytes_is_noop_success() {
    let store = MemoryChunkStore::new();
    let session = Uuid::new_v4();

    store.put(session, 0, b"payload").unwrap();
    store.put(session, 0, b"payload").unwrap();
    assert_eq!(store.len(), 1);
}

#[test]
fn put_with_different_bytes_is_write_conflict() {
    let store = MemoryChunkStore::new();
    let session = Uuid::new_v4();

    store.put(session, 0, b"payload").unwrap();
    match store.put(session, 0, b"different") {
        Err(StoreError::WriteConflict { session_id, sequence_number }) => {
            assert_eq!(session_id, session);
            assert_eq!(sequence_number, 0);
        }
        other => panic!("expected write conflict, got {:?}", other),
    }
}

#[test]
fn get_unknown_ref_is_not_found() {
    let store = MemoryChunkStore::new();
    let storage_ref = StorageRef {
        session_id: Uuid::new_v4(),
        sequence_number: 9,
    };
    assert!(matches!(
        store.get(&storage_ref),
        Err(StoreError::NotFound { .. })
    ));
}

#[test]
fn chunk_records_are_ordered_and_session_scoped() {
    let meta = MemoryMetadataStore::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    // Insert out of order across two sessions.
    meta.put_chunk_record(&chunk_record(a, 2)).unwrap();
    meta.put_chunk_record(&chunk_record(b, 0)).unwrap();
    meta.put_chunk_record(&chunk_record(a, 0)).unwrap();
    meta.put_chunk_record(&chunk_record(a, 1)).unwrap();

    let records = meta.chunk_records(a).unwrap();
    let sequences: Vec<_> = records.iter().map(|r| r.sequence_number).collect();
    assert_eq!(sequences, vec![0, 1, 2]);
    assert!(records.iter().all(|r| r.session_id == a));

    assert_eq!(meta.chunk_records(b).unwrap().len(), 1);
}

#[test]
fn chunk_record_rewrite_with_different_content_conflicts() {
    let meta = MemoryMetadataStore::new();
    let session = Uuid::new_v4();

    meta.put_chunk_record(&chunk_record(session, 0)).unwrap();
    // Identical record: idempotent.
    meta.put_chunk_record(&chunk_record(session, 0)).unwrap();

    let mut altered = chunk_record(session, 0);
    altered.raw_size = 999;
    assert!(matches!(
        meta.put_chunk_record(&altered),
        Err(StoreError::WriteConflict { .. })
    ));
}

#[test]
fn session_upsert_is_read_your_writes() {
    use capture_core::session::SessionRecord;

    let meta = MemoryMetadataStore::new();
    let session = Uuid::new_v4();
    let mut record = SessionRecord::new(session, "owner-1".into(), chrono::Utc::now());

    meta.upsert_session(&record).unwrap();
    assert_eq!(meta.load_session(session).unwrap().unwrap(), record);

    record.chunk_count = 5;
    meta.upsert_session(&record).unwrap();
    assert_eq!(meta.load_session(session).unwrap().unwrap().chunk_count, 5);
}
