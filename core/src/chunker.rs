//! Fixed-size stream chunking with strict sequential commit.
//!
//! Design notes:
//! - One loop, one chunk in flight: chunk i+1 is not read until chunk i's
//!   content hash is computed and its encode/store round-trip resolved.
//!   This bounds memory to one chunk's raw+stored bytes per session and
//!   makes Merkle leaf order trivially equal to commit order.
//! - Backpressure falls out of the loop: a slow or failing store stops
//!   further reads until the in-flight chunk commits or its retry budget
//!   is spent.
//! - Cancellation is cooperative and observed between chunks (and between
//!   retry attempts for Stop). A pause lets the in-flight chunk resolve;
//!   a stop abandons an uncommitted chunk whole. No chunk is ever left
//!   half-written.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use crossbeam::channel::Sender;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::chunk::ChunkRecord;
use crate::codec::ChunkCodec;
use crate::crypto::digest::{content_hash_32, HashAlg};
use crate::external::{read_chunk_or_eof, SessionSource};
use crate::retry::RetryPolicy;
use crate::store::{ChunkStore, MetadataStore};
use crate::telemetry::{ChunkCounters, Stage, StintTimer};
use crate::types::PipelineError;

/// Cooperative control signal shared between a capture stint and its
/// session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CaptureControl {
    Run   = 0,
    Pause = 1,
    Stop  = 2,
}

impl CaptureControl {
    pub fn load(flag: &AtomicU8) -> Self {
        match flag.load(Ordering::Acquire) {
            1 => CaptureControl::Pause,
            2 => CaptureControl::Stop,
            _ => CaptureControl::Run,
        }
    }

    pub fn store(self, flag: &AtomicU8) {
        flag.store(self as u8, Ordering::Release);
    }
}

/// How a capture stint ended (errors surface separately).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StintOutcome {
    /// Clean end-of-stream from the source.
    SourceDrained,
    /// Pause honored; session state retained for resume.
    Paused,
    /// Stop honored; capture is over for this session.
    Stopped,
}

/// A chunk commit exceeded its bounded retry budget. Surfaced to the
/// state machine, which moves the session to FAILED: either a chunk is
/// durably committed or the session is marked failed, nothing in between.
#[derive(Debug)]
pub struct ChunkCommitFailure {
    pub session_id: Uuid,
    pub sequence_number: u64,
    /// Total attempts spent, including the first.
    pub attempts: u32,
    pub reason: String,
}

impl std::fmt::Display for ChunkCommitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "chunk {}/{} failed after {} attempts: {}",
            self.session_id, self.sequence_number, self.attempts, self.reason
        )
    }
}

impl std::error::Error for ChunkCommitFailure {}

/// Consumes the session byte stream and emits committed chunk records,
/// run under the direction of the session state machine.
///
/// Exclusively owns `next_sequence` and the Merkle builder while running;
/// no other component creates or mutates chunk records.
pub struct StreamChunker<'a> {
    pub session_id: Uuid,
    pub chunk_size: usize,
    pub hash_alg: HashAlg,
    pub retry: RetryPolicy,
    pub codec: &'a ChunkCodec,
    pub chunk_store: &'a dyn ChunkStore,
    pub meta_store: &'a dyn MetadataStore,
    pub tree: &'a mut crate::merkle::MerkleTreeBuilder,
    pub counters: &'a mut ChunkCounters,
    pub timer: &'a mut StintTimer,
    pub next_sequence: &'a mut u64,
    pub total_raw_bytes: &'a mut u64,
    /// Optional live subscriber. The bounded channel blocks the chunker
    /// when full rather than buffering unpersisted data.
    pub records_tx: Option<&'a Sender<ChunkRecord>>,
}

impl<'a> StreamChunker<'a> {
    /// Consume the source until end-of-data or a control signal.
    pub fn run(
        &mut self,
        source: &mut dyn SessionSource,
        control: &AtomicU8,
    ) -> Result<StintOutcome, PipelineError> {
        loop {
            match CaptureControl::load(control) {
                CaptureControl::Pause => return Ok(StintOutcome::Paused),
                CaptureControl::Stop => return Ok(StintOutcome::Stopped),
                CaptureControl::Run => {}
            }

            let read_start = Instant::now();
            let raw = read_chunk_or_eof(source, self.chunk_size)?;
            self.timer.add_stage_time(Stage::Read, read_start.elapsed());

            if raw.is_empty() {
                // Stream ended exactly on a chunk boundary: no trailing
                // empty chunk is emitted.
                return Ok(StintOutcome::SourceDrained);
            }

            let final_chunk = raw.len() < self.chunk_size;
            if let Some(outcome) = self.commit_chunk(&raw, final_chunk, control)? {
                return Ok(outcome);
            }
        }
    }

    /// Commit one chunk: hash, encode, store, record, append leaf.
    /// Returns `Some(Stopped)` when a stop signal aborted the retry loop
    /// before the chunk committed.
    fn commit_chunk(
        &mut self,
        raw: &[u8],
        final_chunk: bool,
        control: &AtomicU8,
    ) -> Result<Option<StintOutcome>, PipelineError> {
        let sequence = *self.next_sequence;

        let hash_start = Instant::now();
        let content_hash = content_hash_32(self.hash_alg, raw);
        self.timer.add_stage_time(Stage::Hash, hash_start.elapsed());

        let mut handle = self.retry.handle();
        let record = loop {
            match self.try_commit(sequence, raw, final_chunk, content_hash) {
                Ok(record) => break record,
                Err(err) => {
                    self.counters.add_retry();
                    let delay = match handle.next_delay() {
                        Some(delay) => delay,
                        None => {
                            return Err(ChunkCommitFailure {
                                session_id: self.session_id,
                                sequence_number: sequence,
                                attempts: handle.attempts() + 1,
                                reason: err.to_string(),
                            }
                            .into());
                        }
                    };
                    warn!(
                        session = %self.session_id,
                        sequence,
                        attempt = handle.attempts(),
                        error = %err,
                        "chunk commit failed, retrying"
                    );
                    std::thread::sleep(delay);
                    // A stop during backoff abandons the chunk whole; no
                    // put has durably succeeded for it.
                    if CaptureControl::load(control) == CaptureControl::Stop {
                        return Ok(Some(StintOutcome::Stopped));
                    }
                }
            }
        };

        self.tree.append(content_hash);
        self.counters
            .add_commit(record.raw_size as usize, record.stored_size as usize);
        *self.next_sequence = sequence + 1;
        *self.total_raw_bytes += record.raw_size;

        debug!(
            session = %self.session_id,
            sequence,
            raw = record.raw_size,
            stored = record.stored_size,
            "chunk committed"
        );

        if let Some(tx) = self.records_tx {
            tx.send(record)
                .map_err(|_| PipelineError::Validation("chunk record channel closed".into()))?;
        }

        Ok(None)
    }

    /// One encode + store + index attempt.
    fn try_commit(
        &mut self,
        sequence: u64,
        raw: &[u8],
        final_chunk: bool,
        content_hash: crate::crypto::digest::ContentHash,
    ) -> Result<ChunkRecord, PipelineError> {
        let encode_start = Instant::now();
        let stored = self.codec.encode(sequence, raw, final_chunk)?;
        self.timer.add_stage_time(Stage::Encode, encode_start.elapsed());

        let store_start = Instant::now();
        let storage_ref = self.chunk_store.put(self.session_id, sequence, &stored)?;

        let record = ChunkRecord {
            session_id: self.session_id,
            sequence_number: sequence,
            raw_size: raw.len() as u64,
            stored_size: stored.len() as u64,
            content_hash,
            storage_ref,
        };
        self.meta_store.put_chunk_record(&record)?;
        self.timer.add_stage_time(Stage::Store, store_start.elapsed());

        Ok(record)
    }
}
