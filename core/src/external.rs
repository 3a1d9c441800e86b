//! Capability interfaces for the pipeline's external collaborators.
//!
//! Design notes:
//! - Each collaborator (RDP stream source, auth service, anchoring
//!   service) is a narrow trait the pipeline depends on, substitutable
//!   with a test double. No concrete client wiring lives in this crate.
//! - The metadata store contract lives in `store` alongside the chunk
//!   store; it is the same seam.

use std::io::Read;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunk::record::serde_bytes_hash;
use crate::crypto::digest::ContentHash;

/// Mid-stream source failure, explicitly distinguishable from clean
/// end-of-stream (`read` returning `Ok(0)`).
#[derive(Debug)]
pub enum SourceError {
    /// Transport-level failure while the stream was live.
    Interrupted(String),

    /// I/O error from an adapted reader.
    Io(std::io::Error),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Interrupted(msg) => write!(f, "stream interrupted: {}", msg),
            SourceError::Io(e) => write!(f, "stream I/O error: {}", e),
        }
    }
}

impl std::error::Error for SourceError {}

/// Sequential byte supplier for one session (the RDP recording stream).
///
/// Contract: bytes arrive in order; `Ok(0)` signals clean end-of-stream;
/// `Err` signals a mid-stream failure. Reads may block.
pub trait SessionSource: Send {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError>;
}

/// Adapter from any `std::io::Read` (files, cursors, sockets).
pub struct ReaderSource<R: Read + Send> {
    inner: R,
}

impl<R: Read + Send> ReaderSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read + Send> SessionSource for ReaderSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        self.inner.read(buf).map_err(SourceError::Io)
    }
}

/// Read up to `len` bytes from the source, short only at end-of-stream.
/// Returns an empty buffer on clean EOF with no pending bytes.
pub fn read_chunk_or_eof(
    source: &mut dyn SessionSource,
    len: usize,
) -> Result<Bytes, SourceError> {
    let mut buf = vec![0u8; len];
    let mut off = 0;

    while off < len {
        let n = source.read(&mut buf[off..])?;
        if n == 0 {
            break;
        }
        off += n;
    }

    buf.truncate(off);
    Ok(Bytes::from(buf))
}

#[derive(Debug)]
pub enum AuthError {
    /// Principal rejected by the identity service.
    Denied { owner_id: String },

    /// Identity service unreachable.
    Unavailable(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Denied { owner_id } =>
                write!(f, "authentication denied for owner {}", owner_id),
            AuthError::Unavailable(msg) =>
                write!(f, "auth service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Go/no-go identity confirmation, consumed during AUTHENTICATING.
/// No further interaction during ACTIVE.
pub trait AuthService: Send + Sync {
    fn authorize(&self, owner_id: &str) -> Result<(), AuthError>;
}

/// The record handed to the external anchoring service at finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorReceipt {
    pub session_id: Uuid,
    #[serde(with = "serde_bytes_hash")]
    pub merkle_root: ContentHash,
    pub chunk_count: u64,
    pub finalized_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum AnchorError {
    Rejected(String),
    Unavailable(String),
}

impl std::fmt::Display for AnchorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnchorError::Rejected(msg) => write!(f, "anchor rejected: {}", msg),
            AnchorError::Unavailable(msg) => write!(f, "anchor service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for AnchorError {}

/// External anchoring handoff. The pipeline's obligation ends at `submit`;
/// it never waits for anchoring confirmation to complete a session, and a
/// sink failure is logged, not fatal.
pub trait AnchorSink: Send + Sync {
    fn submit(&self, receipt: &AnchorReceipt) -> Result<(), AnchorError>;
}

/// No-op sink for deployments without an anchoring backend.
#[derive(Default)]
pub struct NullAnchorSink;

impl AnchorSink for NullAnchorSink {
    fn submit(&self, _receipt: &AnchorReceipt) -> Result<(), AnchorError> {
        Ok(())
    }
}

/// Allow-all auth double for tests and closed deployments.
#[derive(Default)]
pub struct AllowAllAuth;

impl AuthService for AllowAllAuth {
    fn authorize(&self, _owner_id: &str) -> Result<(), AuthError> {
        Ok(())
    }
}
