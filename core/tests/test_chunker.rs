use std::io::Cursor;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use capture_core::chunker::{CaptureControl, StintOutcome, StreamChunker};
use capture_core::codec::{ChunkCodec, SessionCrypto};
use capture_core::config::PipelineConfig;
use capture_core::crypto::kdf::MasterKey;
use capture_core::external::{ReaderSource, SessionSource, SourceError};
use capture_core::merkle::MerkleTreeBuilder;
use capture_core::retry::RetryPolicy;
use capture_core::store::{
    ChunkStore, MemoryChunkStore, MemoryMetadataStore, MetadataStore, StorageRef, StoreError,
};
use capture_core::telemetry::{ChunkCounters, StintTimer};
use capture_core::types::PipelineError;
use uuid::Uuid;

const MIB: usize = 1024 * 1024;

fn test_config() -> PipelineConfig {
    PipelineConfig {
        chunk_size_bytes: 10 * MIB,
        commit_backoff_base: Duration::from_millis(1),
        commit_backoff_max: Duration::from_millis(4),
        ..PipelineConfig::default()
    }
}

struct Rig {
    session_id: Uuid,
    config: PipelineConfig,
    codec: ChunkCodec,
    tree: MerkleTreeBuilder,
    counters: ChunkCounters,
    timer: StintTimer,
    next_sequence: u64,
    total_raw_bytes: u64,
}

impl Rig {
    fn new(config: PipelineConfig) -> Self {
        let session_id = Uuid::new_v4();
        let crypto = SessionCrypto::derive(
            &MasterKey::from_bytes([0x11u8; 32]),
            session_id,
            config.cipher,
            config.hkdf_prf,
            [0xA5; 16],
        )
        .unwrap();
        let codec = ChunkCodec::new(&config, crypto);
        let tree = MerkleTreeBuilder::new(config.content_hash);
        Self {
            session_id,
            config,
            codec,
            tree,
            counters: ChunkCounters::default(),
            timer: StintTimer::new(),
            next_sequence: 0,
            total_raw_bytes: 0,
        }
    }

    fn run(
        &mut self,
        chunk_store: &dyn ChunkStore,
        meta_store: &MemoryMetadataStore,
        source: &mut dyn SessionSource,
        control: &AtomicU8,
    ) -> Result<StintOutcome, PipelineError> {
        let retry = RetryPolicy::exponential(
            self.config.max_commit_retries,
            self.config.commit_backoff_base,
            self.config.commit_backoff_max,
        );
        let mut chunker = StreamChunker {
            session_id: self.session_id,
            chunk_size: self.config.chunk_size_bytes,
            hash_alg: self.config.content_hash,
            retry,
            codec: &self.codec,
            chunk_store,
            meta_store,
            tree: &mut self.tree,
            counters: &mut self.counters,
            timer: &mut self.timer,
            next_sequence: &mut self.next_sequence,
            total_raw_bytes: &mut self.total_raw_bytes,
            records_tx: None,
        };
        chunker.run(source, control)
    }
}

fn run_control() -> AtomicU8 {
    AtomicU8::new(CaptureControl::Run as u8)
}

/// Store wrapper failing the first `failures` put attempts.
struct FlakyChunkStore {
    inner: MemoryChunkStore,
    remaining_failures: AtomicU32,
}

impl FlakyChunkStore {
    fn new(failures: u32) -> Self {
        Self {
            inner: MemoryChunkStore::new(),
            remaining_failures: AtomicU32::new(failures),
        }
    }
}

impl ChunkStore for FlakyChunkStore {
    fn put(
        &self,
        session_id: Uuid,
        sequence_number: u64,
        stored_bytes: &[u8],
    ) -> Result<StorageRef, StoreError> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected outage".into()));
        }
        self.inner.put(session_id, sequence_number, stored_bytes)
    }

    fn get(&self, storage_ref: &StorageRef) -> Result<Vec<u8>, StoreError> {
        self.inner.get(storage_ref)
    }
}

/// Source that fails mid-stream after yielding a prefix.
struct FailingSource {
    prefix: Cursor<Vec<u8>>,
}

impl SessionSource for FailingSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        match std::io::Read::read(&mut self.prefix, buf) {
            Ok(0) => Err(SourceError::Interrupted("transport reset".into())),
            Ok(n) => Ok(n),
            Err(e) => Err(SourceError::Io(e)),
        }
    }
}

#[test]
fn scenario_a_25mib_stream_yields_three_chunks() {
    let chunk_store = MemoryChunkStore::new();
    let meta_store = MemoryMetadataStore::new();
    let mut rig = Rig::new(test_config());
    let mut source = ReaderSource::new(Cursor::new(vec![0x5Au8; 25 * MIB]));

    let outcome = rig
        .run(&chunk_store, &meta_store, &mut source, &run_control())
        .unwrap();

    assert_eq!(outcome, StintOutcome::SourceDrained);
    assert_eq!(rig.next_sequence, 3);
    assert_eq!(rig.total_raw_bytes, (25 * MIB) as u64);

    let records = meta_store.chunk_records(rig.session_id).unwrap();
    let sizes: Vec<_> = records.iter().map(|r| r.raw_size).collect();
    assert_eq!(
        sizes,
        vec![(10 * MIB) as u64, (10 * MIB) as u64, (5 * MIB) as u64]
    );
    let sequences: Vec<_> = records.iter().map(|r| r.sequence_number).collect();
    assert_eq!(sequences, vec![0, 1, 2]);
}

#[test]
fn scenario_b_exact_boundary_emits_no_trailing_empty_chunk() {
    let chunk_store = MemoryChunkStore::new();
    let meta_store = MemoryMetadataStore::new();
    let mut rig = Rig::new(test_config());
    let mut source = ReaderSource::new(Cursor::new(vec![0x5Au8; 20 * MIB]));

    let outcome = rig
        .run(&chunk_store, &meta_store, &mut source, &run_control())
        .unwrap();

    assert_eq!(outcome, StintOutcome::SourceDrained);
    assert_eq!(rig.next_sequence, 2);
    assert_eq!(chunk_store.len(), 2);
    assert!(meta_store
        .chunk_records(rig.session_id)
        .unwrap()
        .iter()
        .all(|r| r.raw_size == (10 * MIB) as u64));
}

#[test]
fn scenario_c_two_failures_then_success_commits() {
    let chunk_store = FlakyChunkStore::new(2);
    let meta_store = MemoryMetadataStore::new();
    let mut rig = Rig::new(PipelineConfig {
        chunk_size_bytes: 4096,
        max_commit_retries: 3,
        ..test_config()
    });
    let mut source = ReaderSource::new(Cursor::new(vec![0x33u8; 4096]));

    let outcome = rig
        .run(&chunk_store, &meta_store, &mut source, &run_control())
        .unwrap();

    assert_eq!(outcome, StintOutcome::SourceDrained);
    assert_eq!(rig.next_sequence, 1);
    assert_eq!(rig.counters.commit_retries, 2);
}

#[test]
fn scenario_c_exhausted_budget_surfaces_commit_failure() {
    let chunk_store = FlakyChunkStore::new(4);
    let meta_store = MemoryMetadataStore::new();
    let mut rig = Rig::new(PipelineConfig {
        chunk_size_bytes: 4096,
        max_commit_retries: 3,
        ..test_config()
    });
    let mut source = ReaderSource::new(Cursor::new(vec![0x33u8; 4096]));

    match rig.run(&chunk_store, &meta_store, &mut source, &run_control()) {
        Err(PipelineError::Commit(failure)) => {
            assert_eq!(failure.sequence_number, 0);
            assert_eq!(failure.attempts, 3);
        }
        other => panic!("expected commit failure, got {:?}", other),
    }

    // Nothing committed, nothing in the tree.
    assert_eq!(rig.next_sequence, 0);
    assert!(rig.tree.is_empty());
}

#[test]
fn mid_stream_error_is_distinct_from_eof() {
    let chunk_store = MemoryChunkStore::new();
    let meta_store = MemoryMetadataStore::new();
    let mut rig = Rig::new(PipelineConfig {
        chunk_size_bytes: 1024,
        ..test_config()
    });
    let mut source = FailingSource {
        prefix: Cursor::new(vec![0x44u8; 2048]),
    };

    // Two full chunks commit, then the source dies mid-read.
    match rig.run(&chunk_store, &meta_store, &mut source, &run_control()) {
        Err(PipelineError::Source(SourceError::Interrupted(_))) => {}
        other => panic!("expected source error, got {:?}", other),
    }
    assert_eq!(rig.next_sequence, 2);
}

#[test]
fn pause_signal_parks_between_chunks() {
    let chunk_store = MemoryChunkStore::new();
    let meta_store = MemoryMetadataStore::new();
    let mut rig = Rig::new(PipelineConfig {
        chunk_size_bytes: 1024,
        ..test_config()
    });
    let mut source = ReaderSource::new(Cursor::new(vec![0x44u8; 8192]));

    let control = run_control();
    CaptureControl::Pause.store(&control);

    let outcome = rig
        .run(&chunk_store, &meta_store, &mut source, &control)
        .unwrap();
    assert_eq!(outcome, StintOutcome::Paused);
    assert_eq!(rig.next_sequence, 0);

    // Resume: the same rig continues from where it parked.
    CaptureControl::Run.store(&control);
    let outcome = rig
        .run(&chunk_store, &meta_store, &mut source, &control)
        .unwrap();
    assert_eq!(outcome, StintOutcome::SourceDrained);
    assert_eq!(rig.next_sequence, 8);
}

#[test]
fn merkle_leaves_match_commit_order() {
    let chunk_store = MemoryChunkStore::new();
    let meta_store = MemoryMetadataStore::new();
    let mut rig = Rig::new(PipelineConfig {
        chunk_size_bytes: 1024,
        ..test_config()
    });
    // Distinct chunk contents so leaf order is observable.
    let data: Vec<u8> = (0..4096u32).map(|i| (i / 1024) as u8).collect();
    let mut source = ReaderSource::new(Cursor::new(data));

    rig.run(&chunk_store, &meta_store, &mut source, &run_control())
        .unwrap();

    let records = meta_store.chunk_records(rig.session_id).unwrap();
    assert_eq!(rig.tree.len(), 4);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(rig.tree.leaves()[i], record.content_hash);
    }
}

#[test]
fn arc_shared_store_is_usable_across_sessions() {
    // Shared-resource policy: one store, independent session rigs.
    let chunk_store: Arc<MemoryChunkStore> = Arc::new(MemoryChunkStore::new());
    let meta_store = Arc::new(MemoryMetadataStore::new());

    let mut handles = Vec::new();
    for _ in 0..2 {
        let chunk_store = Arc::clone(&chunk_store);
        let meta_store = Arc::clone(&meta_store);
        handles.push(std::thread::spawn(move || {
            let mut rig = Rig::new(PipelineConfig {
                chunk_size_bytes: 1024,
                ..test_config()
            });
            let mut source = ReaderSource::new(Cursor::new(vec![0x77u8; 3000]));
            rig.run(
                chunk_store.as_ref(),
                meta_store.as_ref(),
                &mut source,
                &run_control(),
            )
            .unwrap();
            (rig.session_id, rig.next_sequence)
        }));
    }

    for handle in handles {
        let (session_id, committed) = handle.join().unwrap();
        assert_eq!(committed, 3);
        assert_eq!(meta_store.chunk_records(session_id).unwrap().len(), 3);
    }
}
