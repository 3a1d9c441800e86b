use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use capture_core::config::PipelineConfig;
use capture_core::crypto::kdf::MasterKey;
use capture_core::external::{
    AllowAllAuth, AnchorError, AnchorReceipt, AnchorSink, AuthError, AuthService, ReaderSource,
    SessionSource, SourceError,
};
use capture_core::session::state::{transition, SessionEvent, SessionState, StateTransitionError};
use capture_core::session::SessionPipeline;
use capture_core::store::{
    ChunkStore, MemoryChunkStore, MemoryMetadataStore, MetadataStore, StorageRef, StoreError,
};
use capture_core::types::PipelineError;
use uuid::Uuid;

const MIB: usize = 1024 * 1024;
const IDLE_WAIT: Duration = Duration::from_secs(30);

fn master_key() -> MasterKey {
    MasterKey::from_bytes([0x11u8; 32])
}

fn small_config() -> PipelineConfig {
    PipelineConfig {
        chunk_size_bytes: MIB,
        commit_backoff_base: Duration::from_millis(1),
        commit_backoff_max: Duration::from_millis(4),
        ..PipelineConfig::default()
    }
}

struct Rig {
    chunk_store: Arc<MemoryChunkStore>,
    meta_store: Arc<MemoryMetadataStore>,
    anchor: Arc<RecordingAnchorSink>,
}

impl Rig {
    fn new() -> Self {
        Self {
            chunk_store: Arc::new(MemoryChunkStore::new()),
            meta_store: Arc::new(MemoryMetadataStore::new()),
            anchor: Arc::new(RecordingAnchorSink::default()),
        }
    }

    fn pipeline(&self, config: PipelineConfig) -> SessionPipeline {
        SessionPipeline::new(
            "owner-1",
            &master_key(),
            config,
            self.chunk_store.clone(),
            self.meta_store.clone(),
            self.anchor.clone(),
        )
        .expect("pipeline should construct")
    }
}

#[derive(Default)]
struct RecordingAnchorSink {
    receipts: Mutex<Vec<AnchorReceipt>>,
}

impl AnchorSink for RecordingAnchorSink {
    fn submit(&self, receipt: &AnchorReceipt) -> Result<(), AnchorError> {
        self.receipts.lock().unwrap().push(receipt.clone());
        Ok(())
    }
}

struct DenyAuth;

impl AuthService for DenyAuth {
    fn authorize(&self, owner_id: &str) -> Result<(), AuthError> {
        Err(AuthError::Denied { owner_id: owner_id.into() })
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

/// Source that trickles bytes so control signals can land mid-capture.
struct ThrottledSource {
    data: Cursor<Vec<u8>>,
    per_read: usize,
    delay: Duration,
}

impl SessionSource for ThrottledSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        std::thread::sleep(self.delay);
        let cap = self.per_read.min(buf.len());
        std::io::Read::read(&mut self.data, &mut buf[..cap]).map_err(SourceError::Io)
    }
}

fn source_of(bytes: Vec<u8>) -> Box<dyn SessionSource> {
    Box::new(ReaderSource::new(Cursor::new(bytes)))
}

#[test]
fn zero_chunk_size_is_rejected_at_construction() {
    let rig = Rig::new();
    let result = SessionPipeline::new(
        "owner-1",
        &master_key(),
        PipelineConfig {
            chunk_size_bytes: 0,
            ..small_config()
        },
        rig.chunk_store.clone(),
        rig.meta_store.clone(),
        rig.anchor.clone(),
    );
    assert!(matches!(result, Err(PipelineError::Config(_))));
}

#[test]
fn happy_path_lifecycle_completes() {
    let rig = Rig::new();
    let pipeline = rig.pipeline(small_config());
    assert_eq!(pipeline.state(), SessionState::Initializing);

    assert_eq!(pipeline.connect().unwrap(), SessionState::Connecting);
    assert_eq!(
        pipeline.authenticate(&AllowAllAuth).unwrap(),
        SessionState::Authenticating
    );

    let total = 2 * MIB + MIB / 2;
    assert_eq!(
        pipeline.start(source_of(vec![0x5Au8; total])).unwrap(),
        SessionState::Active
    );
    assert!(pipeline.wait_capture_idle(IDLE_WAIT));
    assert!(pipeline.source_drained());

    let manifest = pipeline.terminate().expect("terminate should finalize");
    assert_eq!(pipeline.state(), SessionState::Completed);

    assert_eq!(manifest.chunk_count, 3);
    assert_eq!(manifest.total_raw_bytes, total as u64);
    assert_eq!(manifest.chunk_index.len(), 3);

    let record = pipeline.record();
    assert_eq!(record.merkle_root, Some(manifest.merkle_root));
    assert_eq!(record.chunk_count, 3);
    assert!(record.ended_at.is_some());
    assert!(record.telemetry.is_some());

    // Anchoring handoff carries the manifest summary.
    let receipts = rig.anchor.receipts.lock().unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].merkle_root, manifest.merkle_root);
    assert_eq!(receipts[0].chunk_count, 3);
}

#[test]
fn scenario_d_active_cannot_jump_to_completed() {
    // The transition function rejects the jump with no side effect.
    match transition(SessionState::Active, SessionEvent::Finalized) {
        Err(StateTransitionError::Invalid { from, event }) => {
            assert_eq!(from, SessionState::Active);
            assert_eq!(event, SessionEvent::Finalized);
        }
        other => panic!("expected invalid transition, got {:?}", other),
    }
}

#[test]
fn transition_table_matches_lifecycle() {
    use SessionEvent::*;
    use SessionState::*;

    assert_eq!(transition(Initializing, Connect).unwrap(), Connecting);
    assert_eq!(transition(Connecting, Authenticate).unwrap(), Authenticating);
    assert_eq!(transition(Authenticating, Activate).unwrap(), Active);
    assert_eq!(transition(Active, Suspend).unwrap(), Suspending);
    assert_eq!(transition(Suspending, Activate).unwrap(), Active);
    assert_eq!(transition(Active, Terminate).unwrap(), Terminating);
    assert_eq!(transition(Suspending, Terminate).unwrap(), Terminating);
    assert_eq!(transition(Terminating, Finalized).unwrap(), Completed);

    // FAILED from any non-terminal state; terminals are frozen.
    for state in [Initializing, Connecting, Authenticating, Active, Suspending, Terminating] {
        assert_eq!(transition(state, Fail).unwrap(), Failed);
    }
    for state in [Completed, Failed] {
        assert!(transition(state, Fail).is_err());
        assert!(transition(state, Activate).is_err());
        assert!(transition(state, Terminate).is_err());
    }
}

#[test]
fn rejected_transition_leaves_state_unchanged() {
    let rig = Rig::new();
    let pipeline = rig.pipeline(small_config());

    // Suspend is not legal from INITIALIZING.
    assert!(matches!(
        pipeline.suspend(),
        Err(PipelineError::Transition(StateTransitionError::Invalid { .. }))
    ));
    assert_eq!(pipeline.state(), SessionState::Initializing);
}

#[test]
fn completed_session_rejects_further_transitions() {
    let rig = Rig::new();
    let pipeline = rig.pipeline(small_config());

    pipeline.connect().unwrap();
    pipeline.authenticate(&AllowAllAuth).unwrap();
    pipeline.start(source_of(vec![1u8; MIB / 2])).unwrap();
    assert!(pipeline.wait_capture_idle(IDLE_WAIT));
    pipeline.terminate().unwrap();

    assert!(matches!(
        pipeline.terminate(),
        Err(PipelineError::Transition(_))
    ));
    assert!(matches!(
        pipeline.start(source_of(vec![1u8; 16])),
        Err(PipelineError::Transition(_))
    ));
    assert_eq!(pipeline.state(), SessionState::Completed);
}

#[test]
fn auth_denial_fails_the_session() {
    let rig = Rig::new();
    let pipeline = rig.pipeline(small_config());

    pipeline.connect().unwrap();
    assert!(matches!(
        pipeline.authenticate(&DenyAuth),
        Err(PipelineError::Auth(AuthError::Denied { .. }))
    ));
    assert_eq!(pipeline.state(), SessionState::Failed);
    assert!(pipeline.failure_report().is_some());
}

#[test]
fn mid_stream_failure_reports_last_committed_sequence() {
    let rig = Rig::new();
    let pipeline = rig.pipeline(PipelineConfig {
        chunk_size_bytes: 1024,
        ..small_config()
    });

    pipeline.connect().unwrap();
    pipeline.authenticate(&AllowAllAuth).unwrap();
    pipeline
        .start(Box::new(FailingSource {
            prefix: Cursor::new(vec![0x44u8; 2048]),
        }))
        .unwrap();
    assert!(pipeline.wait_capture_idle(IDLE_WAIT));

    assert_eq!(pipeline.state(), SessionState::Failed);
    let report = pipeline.failure_report().expect("failure report present");
    assert_eq!(report.last_committed_sequence, Some(1));
    assert!(report.reason.contains("transport reset"));

    // A failed session is terminal; no finalization.
    assert!(pipeline.terminate().is_err());
    let record = pipeline.record();
    assert_eq!(record.merkle_root, None);
    assert_eq!(record.chunk_count, 2);
}

#[test]
fn suspend_retains_state_and_resume_continues() {
    let rig = Rig::new();
    let pipeline = rig.pipeline(PipelineConfig {
        chunk_size_bytes: 4096,
        ..small_config()
    });

    let total = 64 * 1024;
    pipeline.connect().unwrap();
    pipeline.authenticate(&AllowAllAuth).unwrap();
    pipeline
        .start(Box::new(ThrottledSource {
            data: Cursor::new(vec![0x99u8; total]),
            per_read: 1024,
            delay: Duration::from_millis(2),
        }))
        .unwrap();

    // Let a few chunks land, then pause.
    std::thread::sleep(Duration::from_millis(20));
    let state = pipeline.suspend().unwrap();
    assert_eq!(state, SessionState::Suspending);
    let parked_count = pipeline.record().chunk_count;
    assert!(parked_count < (total / 4096) as u64);

    // Resume and drain.
    assert_eq!(pipeline.resume().unwrap(), SessionState::Active);
    assert!(pipeline.wait_capture_idle(IDLE_WAIT));
    assert!(pipeline.source_drained());

    let manifest = pipeline.terminate().unwrap();
    assert_eq!(manifest.total_raw_bytes, total as u64);
    assert_eq!(manifest.chunk_count, (total / 4096) as u64);
    assert!(manifest.chunk_count >= parked_count);
}

#[test]
fn resume_cycle_limit_is_enforced() {
    let rig = Rig::new();
    let pipeline = rig.pipeline(PipelineConfig {
        chunk_size_bytes: 4096,
        max_resume_cycles: Some(1),
        ..small_config()
    });

    pipeline.connect().unwrap();
    pipeline.authenticate(&AllowAllAuth).unwrap();
    pipeline
        .start(Box::new(ThrottledSource {
            data: Cursor::new(vec![0x99u8; 1024 * 1024]),
            per_read: 1024,
            delay: Duration::from_millis(1),
        }))
        .unwrap();

    pipeline.suspend().unwrap();
    pipeline.resume().unwrap();
    pipeline.suspend().unwrap();

    assert!(matches!(
        pipeline.resume(),
        Err(PipelineError::Transition(StateTransitionError::ResumeLimit { limit: 1 }))
    ));

    pipeline.terminate().unwrap();
}

#[test]
fn scenario_e_concurrent_sessions_do_not_interfere() {
    let rig = Rig::new();

    let mut handles = Vec::new();
    for fill in [0xAAu8, 0xBBu8] {
        let pipeline = rig.pipeline(PipelineConfig {
            chunk_size_bytes: 10 * MIB,
            ..small_config()
        });
        handles.push(std::thread::spawn(move || {
            pipeline.connect().unwrap();
            pipeline.authenticate(&AllowAllAuth).unwrap();
            pipeline.start(source_of(vec![fill; 15 * MIB])).unwrap();
            assert!(pipeline.wait_capture_idle(IDLE_WAIT));
            pipeline.terminate().unwrap()
        }));
    }

    let manifests: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for manifest in &manifests {
        assert_eq!(manifest.chunk_count, 2);
        assert_eq!(manifest.total_raw_bytes, (15 * MIB) as u64);
    }
    assert_ne!(manifests[0].session_id, manifests[1].session_id);
    // Different content, different roots.
    assert_ne!(manifests[0].merkle_root, manifests[1].merkle_root);
}

/// Store wrapper failing the first `failures` put attempts.
struct FlakyChunkStore {
    inner: MemoryChunkStore,
    remaining_failures: AtomicU32,
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

#[test]
fn commit_exhaustion_moves_session_to_failed() {
    let meta_store = Arc::new(MemoryMetadataStore::new());
    let chunk_store = Arc::new(FlakyChunkStore {
        inner: MemoryChunkStore::new(),
        remaining_failures: AtomicU32::new(10),
    });

    let pipeline = SessionPipeline::new(
        "owner-1",
        &master_key(),
        PipelineConfig {
            chunk_size_bytes: 4096,
            max_commit_retries: 3,
            ..small_config()
        },
        chunk_store,
        meta_store.clone(),
        Arc::new(RecordingAnchorSink::default()),
    )
    .unwrap();

    pipeline.connect().unwrap();
    pipeline.authenticate(&AllowAllAuth).unwrap();
    pipeline.start(source_of(vec![0x33u8; 4096])).unwrap();
    assert!(pipeline.wait_capture_idle(IDLE_WAIT));

    assert_eq!(pipeline.state(), SessionState::Failed);
    let report = pipeline.failure_report().unwrap();
    assert_eq!(report.last_committed_sequence, None);
    assert!(report.reason.contains("after 3 attempts"));

    // Persisted record reflects the failure.
    let stored = meta_store
        .load_session(pipeline.session_id())
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, SessionState::Failed);
}

#[test]
fn explicit_fail_from_early_state() {
    let rig = Rig::new();
    let pipeline = rig.pipeline(small_config());

    pipeline.connect().unwrap();
    assert_eq!(
        pipeline.fail("transport lost").unwrap(),
        SessionState::Failed
    );
    let report = pipeline.failure_report().unwrap();
    assert_eq!(report.last_committed_sequence, None);
    assert_eq!(report.reason, "transport lost");
}

#[test]
fn chunk_record_subscription_sees_commits_in_order() {
    let rig = Rig::new();
    let pipeline = rig.pipeline(PipelineConfig {
        chunk_size_bytes: 1024,
        ..small_config()
    });
    let records = pipeline.subscribe(64);

    pipeline.connect().unwrap();
    pipeline.authenticate(&AllowAllAuth).unwrap();
    pipeline.start(source_of(vec![0x12u8; 5 * 1024])).unwrap();
    assert!(pipeline.wait_capture_idle(IDLE_WAIT));
    pipeline.terminate().unwrap();

    let sequences: Vec<_> = records.try_iter().map(|r| r.sequence_number).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
}
