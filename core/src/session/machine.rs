//! session/machine.rs
//! End-to-end lifecycle orchestration; the only public entry point
//! external callers use.
//!
//! Design notes:
//! - One in-flight transition per session: every public lifecycle call
//!   serializes behind a gate with a bounded wait
//!   (`transition_lock_timeout`). Different sessions share nothing but
//!   the stores and master key; their pipelines run fully concurrently.
//! - ACTIVE runs the capture stint on a dedicated thread. Suspend and
//!   terminate signal the stint cooperatively and wait for it to park;
//!   the in-flight chunk either fully commits or is discarded whole.
//! - The stint thread never takes the transition gate (a waiting
//!   suspend/terminate holds it); it mutates the session core directly,
//!   which stays atomic under the core mutex.

use std::sync::atomic::AtomicU8;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam::channel::{bounded, Receiver, Sender};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunk::ChunkRecord;
use crate::chunker::{CaptureControl, StintOutcome, StreamChunker};
use crate::codec::{ChunkCodec, SessionCrypto};
use crate::config::PipelineConfig;
use crate::crypto::kdf::MasterKey;
use crate::crypto::nonce::generate_salt;
use crate::external::{AnchorSink, AuthService, SessionSource};
use crate::merkle::MerkleTreeBuilder;
use crate::retry::RetryPolicy;
use crate::session::manifest::{Manifest, SessionManifestWriter};
use crate::session::record::{FailureReport, SessionRecord};
use crate::session::state::{transition, SessionEvent, SessionState, StateTransitionError};
use crate::store::{ChunkStore, MetadataStore};
use crate::telemetry::{SessionTelemetry, StintTimer};
use crate::types::PipelineError;

/// Serializes transitions for one session. The second concurrent request
/// waits up to the configured timeout, then fails as already-transitioning.
struct TransitionGate {
    busy: Mutex<bool>,
    cv: Condvar,
}

impl TransitionGate {
    fn new() -> Self {
        Self {
            busy: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn acquire(&self, timeout: Duration) -> Result<TransitionPermit<'_>, StateTransitionError> {
        let start = Instant::now();
        let mut busy = self.busy.lock().unwrap();
        while *busy {
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(StateTransitionError::Busy { waited });
            }
            let (guard, result) = self.cv.wait_timeout(busy, timeout - waited).unwrap();
            busy = guard;
            if result.timed_out() && *busy {
                return Err(StateTransitionError::Busy { waited: start.elapsed() });
            }
        }
        *busy = true;
        Ok(TransitionPermit { gate: self })
    }
}

struct TransitionPermit<'a> {
    gate: &'a TransitionGate,
}

impl Drop for TransitionPermit<'_> {
    fn drop(&mut self) {
        *self.gate.busy.lock().unwrap() = false;
        self.gate.cv.notify_all();
    }
}

/// Per-session pipeline state owned exclusively by this session: codec,
/// Merkle builder, counters, sequence cursor, and the retained source.
/// Moved into the stint thread while capturing, parked here otherwise.
struct CaptureState {
    codec: ChunkCodec,
    tree: MerkleTreeBuilder,
    counters: crate::telemetry::ChunkCounters,
    next_sequence: u64,
    total_raw_bytes: u64,
    source: Option<Box<dyn SessionSource>>,
}

struct Core {
    record: SessionRecord,
    capture: Option<CaptureState>,
    capture_running: bool,
    stint: Option<JoinHandle<()>>,
    control: Arc<AtomicU8>,
    resume_cycles: u32,
    source_exhausted: bool,
}

struct Shared {
    session_id: Uuid,
    config: PipelineConfig,
    chunk_store: Arc<dyn ChunkStore>,
    meta_store: Arc<dyn MetadataStore>,
    anchor: Arc<dyn AnchorSink>,
    gate: TransitionGate,
    core: Mutex<Core>,
    idle: Condvar,
    records_tx: Mutex<Option<Sender<ChunkRecord>>>,
}

/// One session's state machine and pipeline.
pub struct SessionPipeline {
    shared: Arc<Shared>,
}

impl SessionPipeline {
    /// Create the session: record persisted in INITIALIZING, identifiers
    /// assigned, per-session key derived. No chunk activity yet.
    pub fn new(
        owner_id: impl Into<String>,
        master_key: &MasterKey,
        config: PipelineConfig,
        chunk_store: Arc<dyn ChunkStore>,
        meta_store: Arc<dyn MetadataStore>,
        anchor: Arc<dyn AnchorSink>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let session_id = Uuid::new_v4();
        let salt = generate_salt();
        let crypto = SessionCrypto::derive(
            master_key,
            session_id,
            config.cipher,
            config.hkdf_prf,
            salt,
        )?;
        let codec = ChunkCodec::new(&config, crypto);

        let record = SessionRecord::new(session_id, owner_id.into(), Utc::now());
        meta_store.upsert_session(&record)?;
        info!(session = %session_id, owner = %record.owner_id, "session created");

        let capture = CaptureState {
            codec,
            tree: MerkleTreeBuilder::new(config.content_hash),
            counters: Default::default(),
            next_sequence: 0,
            total_raw_bytes: 0,
            source: None,
        };

        let shared = Arc::new(Shared {
            session_id,
            config,
            chunk_store,
            meta_store,
            anchor,
            gate: TransitionGate::new(),
            core: Mutex::new(Core {
                record,
                capture: Some(capture),
                capture_running: false,
                stint: None,
                control: Arc::new(AtomicU8::new(CaptureControl::Run as u8)),
                resume_cycles: 0,
                source_exhausted: false,
            }),
            idle: Condvar::new(),
            records_tx: Mutex::new(None),
        });

        Ok(Self { shared })
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.session_id
    }

    pub fn state(&self) -> SessionState {
        self.shared.core.lock().unwrap().record.state
    }

    pub fn record(&self) -> SessionRecord {
        self.shared.core.lock().unwrap().record.clone()
    }

    pub fn failure_report(&self) -> Option<FailureReport> {
        self.shared.core.lock().unwrap().record.failure.clone()
    }

    /// True once the source reported clean end-of-stream.
    pub fn source_drained(&self) -> bool {
        self.shared.core.lock().unwrap().source_exhausted
    }

    /// Attach a live subscriber for committed chunk records. The bounded
    /// channel applies backpressure to the chunker when full; dropping
    /// the receiver mid-session fails the session on the next commit.
    pub fn subscribe(&self, capacity: usize) -> Receiver<ChunkRecord> {
        let (tx, rx) = bounded(capacity);
        *self.shared.records_tx.lock().unwrap() = Some(tx);
        rx
    }

    /// Transport established (signaled by the RDP collaborator).
    pub fn connect(&self) -> Result<SessionState, PipelineError> {
        let _permit = self.acquire_gate()?;
        let mut core = self.shared.core.lock().unwrap();
        self.apply_event(&mut core, SessionEvent::Connect)
    }

    /// Confirm the principal with the identity collaborator. Denial is
    /// unrecoverable: the session moves to FAILED.
    pub fn authenticate(&self, auth: &dyn AuthService) -> Result<SessionState, PipelineError> {
        let _permit = self.acquire_gate()?;
        {
            let mut core = self.shared.core.lock().unwrap();
            self.apply_event(&mut core, SessionEvent::Authenticate)?;
        }

        let owner_id = {
            let core = self.shared.core.lock().unwrap();
            core.record.owner_id.clone()
        };

        match auth.authorize(&owner_id) {
            Ok(()) => Ok(SessionState::Authenticating),
            Err(err) => {
                let mut core = self.shared.core.lock().unwrap();
                self.fail_locked(&mut core, format!("auth: {}", err));
                Err(PipelineError::Auth(err))
            }
        }
    }

    /// Begin capture: AUTHENTICATING -> ACTIVE, chunker started on its
    /// own thread.
    pub fn start(
        &self,
        source: Box<dyn SessionSource>,
    ) -> Result<SessionState, PipelineError> {
        let _permit = self.acquire_gate()?;
        let mut core = self.shared.core.lock().unwrap();
        // Reject illegal lifecycle requests before anything else.
        transition(core.record.state, SessionEvent::Activate)?;
        if core.capture.is_none() {
            return Err(PipelineError::Validation("capture state unavailable".into()));
        }
        let state = self.apply_event(&mut core, SessionEvent::Activate)?;
        self.spawn_stint(&mut core, Some(source));
        Ok(state)
    }

    /// Pause capture without finalizing. Waits for the stint to park;
    /// Merkle leaves and the sequence cursor are retained for resume.
    pub fn suspend(&self) -> Result<SessionState, PipelineError> {
        let _permit = self.acquire_gate()?;
        {
            let mut core = self.shared.core.lock().unwrap();
            self.apply_event(&mut core, SessionEvent::Suspend)?;
            CaptureControl::Pause.store(&core.control);
        }
        self.wait_idle_and_join();
        Ok(self.state())
    }

    /// Resume capture from SUSPENDING, bounded by `max_resume_cycles`.
    pub fn resume(&self) -> Result<SessionState, PipelineError> {
        let _permit = self.acquire_gate()?;
        let mut core = self.shared.core.lock().unwrap();

        if let Some(limit) = self.shared.config.max_resume_cycles {
            if core.resume_cycles >= limit {
                return Err(StateTransitionError::ResumeLimit { limit }.into());
            }
        }
        let has_source = core
            .capture
            .as_ref()
            .is_some_and(|capture| capture.source.is_some());
        if !has_source {
            return Err(PipelineError::Validation("no session source retained".into()));
        }

        let state = self.apply_event(&mut core, SessionEvent::Activate)?;
        core.resume_cycles += 1;
        self.spawn_stint(&mut core, None);
        Ok(state)
    }

    /// Stop capture permanently, finalize the manifest exactly once, and
    /// hand the anchor receipt to the anchoring collaborator. The handoff
    /// is fire-and-forget: anchoring failures are logged, never block
    /// COMPLETED.
    pub fn terminate(&self) -> Result<Manifest, PipelineError> {
        let _permit = self.acquire_gate()?;
        {
            let mut core = self.shared.core.lock().unwrap();
            self.apply_event(&mut core, SessionEvent::Terminate)?;
            CaptureControl::Stop.store(&core.control);
        }
        self.wait_idle_and_join();

        let manifest = {
            let mut core = self.shared.core.lock().unwrap();

            // The stint may have failed the session while we waited.
            if core.record.state != SessionState::Terminating {
                return Err(StateTransitionError::Invalid {
                    from: core.record.state,
                    event: SessionEvent::Finalized,
                }
                .into());
            }

            let capture = core
                .capture
                .as_ref()
                .ok_or_else(|| PipelineError::Validation("capture state unavailable".into()))?;

            let writer = SessionManifestWriter::new(self.shared.meta_store.as_ref());
            let manifest = match writer.finalize(self.shared.session_id, &capture.tree, Utc::now())
            {
                Ok(manifest) => manifest,
                Err(err) => {
                    self.fail_locked(&mut core, format!("finalization: {}", err));
                    return Err(err.into());
                }
            };

            core.record.merkle_root = Some(manifest.merkle_root);
            core.record.chunk_count = manifest.chunk_count;
            core.record.total_raw_bytes = manifest.total_raw_bytes;
            self.apply_event(&mut core, SessionEvent::Finalized)?;
            manifest
        };

        if let Err(err) = self.shared.anchor.submit(&manifest.anchor_receipt()) {
            warn!(
                session = %self.shared.session_id,
                error = %err,
                "anchor handoff failed; session remains completed"
            );
        }

        Ok(manifest)
    }

    /// Mark the session failed from any non-terminal state (e.g., the
    /// transport died while CONNECTING).
    pub fn fail(&self, reason: impl Into<String>) -> Result<SessionState, PipelineError> {
        let _permit = self.acquire_gate()?;
        {
            let core = self.shared.core.lock().unwrap();
            if core.capture_running {
                CaptureControl::Stop.store(&core.control);
            }
        }
        self.wait_idle_and_join();

        let mut core = self.shared.core.lock().unwrap();
        transition(core.record.state, SessionEvent::Fail)?;
        self.fail_locked(&mut core, reason.into());
        Ok(core.record.state)
    }

    /// Block until no capture stint is running, up to `timeout`.
    pub fn wait_capture_idle(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let mut core = self.shared.core.lock().unwrap();
        while core.capture_running {
            let waited = start.elapsed();
            if waited >= timeout {
                return false;
            }
            let (guard, result) = self
                .shared
                .idle
                .wait_timeout(core, timeout - waited)
                .unwrap();
            core = guard;
            if result.timed_out() && core.capture_running {
                return false;
            }
        }
        let stint = core.stint.take();
        drop(core);
        if let Some(handle) = stint {
            let _ = handle.join();
        }
        true
    }

    fn acquire_gate(&self) -> Result<TransitionPermit<'_>, PipelineError> {
        Ok(self
            .shared
            .gate
            .acquire(self.shared.config.transition_lock_timeout)?)
    }

    /// Apply one lifecycle event under the core lock and persist the
    /// record. A rejected transition mutates nothing.
    fn apply_event(
        &self,
        core: &mut Core,
        event: SessionEvent,
    ) -> Result<SessionState, PipelineError> {
        let prev = core.record.state;
        let prev_ended = core.record.ended_at;
        let next = transition(prev, event)?;
        core.record.state = next;
        if next.is_terminal() {
            core.record.ended_at = Some(Utc::now());
        }
        if let Err(err) = self.shared.meta_store.upsert_session(&core.record) {
            // A transition that fails to persist does not apply.
            core.record.state = prev;
            core.record.ended_at = prev_ended;
            return Err(err.into());
        }
        info!(session = %self.shared.session_id, %prev, %next, "transition");
        Ok(next)
    }

    /// Move to FAILED with a report; best-effort if already terminal.
    fn fail_locked(&self, core: &mut Core, reason: String) {
        if core.record.state.is_terminal() {
            return;
        }
        let last_committed = core
            .capture
            .as_ref()
            .and_then(|capture| capture.next_sequence.checked_sub(1));
        core.record.failure = Some(FailureReport {
            last_committed_sequence: last_committed,
            reason: reason.clone(),
            failed_at: Utc::now(),
        });
        core.record.state = SessionState::Failed;
        core.record.ended_at = Some(Utc::now());
        if let Err(err) = self.shared.meta_store.upsert_session(&core.record) {
            warn!(session = %self.shared.session_id, error = %err, "failed to persist failure");
        }
        warn!(session = %self.shared.session_id, %reason, "session failed");
    }

    /// Start a capture stint thread. Caller holds the gate and the core
    /// lock and has already applied the ACTIVE transition.
    fn spawn_stint(&self, core: &mut Core, source: Option<Box<dyn SessionSource>>) {
        let mut capture = core
            .capture
            .take()
            .expect("capture state present while spawning");
        if let Some(source) = source {
            capture.source = Some(source);
        }

        CaptureControl::Run.store(&core.control);
        core.capture_running = true;

        let shared = Arc::clone(&self.shared);
        let control = Arc::clone(&core.control);
        core.stint = Some(std::thread::spawn(move || {
            stint_main(shared, capture, control);
        }));
    }

    fn wait_idle_and_join(&self) {
        let mut core = self.shared.core.lock().unwrap();
        while core.capture_running {
            core = self.shared.idle.wait(core).unwrap();
        }
        let stint = core.stint.take();
        drop(core);
        if let Some(handle) = stint {
            let _ = handle.join();
        }
    }
}

/// Capture stint body. Runs the chunker, then folds the outcome back
/// into the session core. Applies FAILED directly (never via the gate:
/// a waiting suspend/terminate holds it).
fn stint_main(shared: Arc<Shared>, mut capture: CaptureState, control: Arc<AtomicU8>) {
    let session_id = shared.session_id;
    let mut timer = StintTimer::new();
    let mut source = match capture.source.take() {
        Some(source) => source,
        None => {
            finish_stint(
                &shared,
                capture,
                &timer,
                Err("no session source attached".into()),
            );
            shared.idle.notify_all();
            return;
        }
    };

    let records_tx = shared.records_tx.lock().unwrap().clone();
    let retry = RetryPolicy::exponential(
        shared.config.max_commit_retries,
        shared.config.commit_backoff_base,
        shared.config.commit_backoff_max,
    )
    .with_jitter(0.2);

    let result = {
        let mut chunker = StreamChunker {
            session_id,
            chunk_size: shared.config.chunk_size_bytes,
            hash_alg: shared.config.content_hash,
            retry,
            codec: &capture.codec,
            chunk_store: shared.chunk_store.as_ref(),
            meta_store: shared.meta_store.as_ref(),
            tree: &mut capture.tree,
            counters: &mut capture.counters,
            timer: &mut timer,
            next_sequence: &mut capture.next_sequence,
            total_raw_bytes: &mut capture.total_raw_bytes,
            records_tx: records_tx.as_ref(),
        };
        chunker.run(source.as_mut(), &control)
    };
    timer.finish();
    capture.source = Some(source);

    let result = match result {
        Ok(outcome) => {
            debug!(session = %session_id, ?outcome, chunks = capture.tree.len(), "stint ended");
            Ok(outcome)
        }
        Err(err) => Err(err.to_string()),
    };
    finish_stint(&shared, capture, &timer, result);
    shared.idle.notify_all();
}

/// Park the capture state, fold stint bookkeeping into the record, and on
/// error move the session to FAILED.
fn finish_stint(
    shared: &Arc<Shared>,
    capture: CaptureState,
    timer: &StintTimer,
    result: Result<StintOutcome, String>,
) {
    let mut core = shared.core.lock().unwrap();
    core.record.chunk_count = capture.tree.len();
    core.record.total_raw_bytes = capture.total_raw_bytes;
    core.record.telemetry = Some(SessionTelemetry::from(&capture.counters, timer));
    match result {
        Ok(StintOutcome::SourceDrained) => core.source_exhausted = true,
        Ok(StintOutcome::Paused) | Ok(StintOutcome::Stopped) => {}
        Err(reason) => {
            if !core.record.state.is_terminal() {
                core.record.failure = Some(FailureReport {
                    last_committed_sequence: capture.next_sequence.checked_sub(1),
                    reason: reason.clone(),
                    failed_at: Utc::now(),
                });
                core.record.state = SessionState::Failed;
                core.record.ended_at = Some(Utc::now());
                warn!(session = %shared.session_id, %reason, "session failed");
            }
        }
    }
    core.capture = Some(capture);
    core.capture_running = false;
    if let Err(err) = shared.meta_store.upsert_session(&core.record) {
        warn!(session = %shared.session_id, error = %err, "failed to persist stint result");
    }
}
