//! telemetry/counters.rs
//! Mutable counters accumulated while a session's chunker runs.
//!
//! Converted into an immutable `SessionTelemetry` snapshot at stint end.

use bincode::{Decode, Encode};

/// Deterministic counters collected during chunk processing.
#[derive(Default, Clone, Debug, Encode, Decode, PartialEq)]
pub struct ChunkCounters {
    pub chunks_committed: u64,
    pub commit_retries: u64,
    pub bytes_raw: u64,
    pub bytes_stored: u64,
}

impl ChunkCounters {
    /// Record one committed chunk.
    ///
    /// - `raw_len`: plaintext length before compression
    /// - `stored_len`: header + ciphertext length persisted to the store
    pub fn add_commit(&mut self, raw_len: usize, stored_len: usize) {
        self.chunks_committed += 1;
        self.bytes_raw += raw_len as u64;
        self.bytes_stored += stored_len as u64;
    }

    /// Record one retried commit attempt.
    pub fn add_retry(&mut self) {
        self.commit_retries += 1;
    }

    /// Merge counters from another stint of the same session.
    pub fn merge(&mut self, other: &ChunkCounters) {
        self.chunks_committed += other.chunks_committed;
        self.commit_retries += other.commit_retries;
        self.bytes_raw += other.bytes_raw;
        self.bytes_stored += other.bytes_stored;
    }
}
