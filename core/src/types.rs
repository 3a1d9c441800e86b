//! Unified pipeline error covering I/O, header, crypto, compression,
//! storage, lifecycle, and integrity failures.
//!
//! - Ergonomic `From<T>` impls enable `?` across the pipeline.
//! - Messages aim to be stable and contextual for telemetry and logs.

use std::fmt;
use std::io;

use crate::chunk::HeaderError;
use crate::chunker::ChunkCommitFailure;
use crate::compression::CompressionError;
use crate::config::ConfigError;
use crate::crypto::digest::ContentHash;
use crate::crypto::CryptoError;
use crate::external::{AuthError, SourceError};
use crate::merkle::MerkleError;
use crate::session::manifest::ManifestError;
use crate::session::state::StateTransitionError;
use crate::store::StoreError;

/// Read-side integrity failure. Always surfaced to the caller, never
/// swallowed: a proof-carrying pipeline that hides verification failures
/// is worse than one that has none.
#[derive(Debug)]
pub enum IntegrityError {
    /// AEAD authentication failed (tampering or key mismatch).
    TagMismatch { sequence_number: u64 },

    /// Post-decryption checksum over the raw bytes failed.
    ChecksumMismatch { sequence_number: u64 },

    /// Stored chunk carries a different sequence number than requested.
    SequenceMismatch { expected: u64, found: u64 },

    /// Recomputed content hash differs from the manifest entry.
    ContentHashMismatch {
        sequence_number: u64,
        expected: ContentHash,
        actual: ContentHash,
    },

    /// Recomputed Merkle root differs from the manifest root.
    RootMismatch { expected: ContentHash, actual: ContentHash },
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use IntegrityError::*;
        match self {
            TagMismatch { sequence_number } =>
                write!(f, "chunk {}: AEAD tag mismatch", sequence_number),
            ChecksumMismatch { sequence_number } =>
                write!(f, "chunk {}: checksum mismatch", sequence_number),
            SequenceMismatch { expected, found } =>
                write!(f, "sequence mismatch: expected {}, stored {}", expected, found),
            ContentHashMismatch { sequence_number, expected, actual } =>
                write!(f, "chunk {}: content hash mismatch: expected {}, actual {}",
                       sequence_number, hex::encode(expected), hex::encode(actual)),
            RootMismatch { expected, actual } =>
                write!(f, "merkle root mismatch: expected {}, actual {}",
                       hex::encode(expected), hex::encode(actual)),
        }
    }
}

impl std::error::Error for IntegrityError {}

/// Unified pipeline error.
#[derive(Debug)]
pub enum PipelineError {
    /// I/O error from the underlying stream or store backend.
    Io(io::Error),

    /// Invalid pipeline configuration.
    Config(ConfigError),

    /// Chunk wire header error (validation or parse).
    Header(HeaderError),

    /// Cryptographic error (AEAD, key/nonce policy).
    Crypto(CryptoError),

    /// Compression or decompression error.
    Compression(CompressionError),

    /// Merkle tree error.
    Merkle(MerkleError),

    /// Metadata or chunk store error.
    Store(StoreError),

    /// Session source error (mid-stream failure, not clean EOF).
    Source(SourceError),

    /// Authentication denied or unavailable.
    Auth(AuthError),

    /// Invalid lifecycle transition request.
    Transition(StateTransitionError),

    /// Chunk commit exceeded its retry budget.
    Commit(ChunkCommitFailure),

    /// Read-side integrity failure.
    Integrity(IntegrityError),

    /// Manifest finalization error.
    Manifest(ManifestError),

    /// Generic high-level validation with a descriptive message.
    Validation(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use PipelineError::*;
        match self {
            Io(e) => write!(f, "I/O error: {}", e),
            Config(e) => write!(f, "config error: {}", e),
            Header(e) => write!(f, "header error: {}", e),
            Crypto(e) => write!(f, "crypto error: {}", e),
            Compression(e) => write!(f, "compression error: {}", e),
            Merkle(e) => write!(f, "merkle error: {}", e),
            Store(e) => write!(f, "store error: {}", e),
            Source(e) => write!(f, "source error: {}", e),
            Auth(e) => write!(f, "auth error: {}", e),
            Transition(e) => write!(f, "transition error: {}", e),
            Commit(e) => write!(f, "commit failure: {}", e),
            Integrity(e) => write!(f, "integrity error: {}", e),
            Manifest(e) => write!(f, "manifest error: {}", e),
            Validation(msg) => write!(f, "validation error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<io::Error> for PipelineError {
    fn from(e: io::Error) -> Self {
        PipelineError::Io(e)
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        PipelineError::Config(e)
    }
}

impl From<HeaderError> for PipelineError {
    fn from(e: HeaderError) -> Self {
        PipelineError::Header(e)
    }
}

impl From<CryptoError> for PipelineError {
    fn from(e: CryptoError) -> Self {
        PipelineError::Crypto(e)
    }
}

impl From<CompressionError> for PipelineError {
    fn from(e: CompressionError) -> Self {
        PipelineError::Compression(e)
    }
}

impl From<MerkleError> for PipelineError {
    fn from(e: MerkleError) -> Self {
        PipelineError::Merkle(e)
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        PipelineError::Store(e)
    }
}

impl From<SourceError> for PipelineError {
    fn from(e: SourceError) -> Self {
        PipelineError::Source(e)
    }
}

impl From<AuthError> for PipelineError {
    fn from(e: AuthError) -> Self {
        PipelineError::Auth(e)
    }
}

impl From<StateTransitionError> for PipelineError {
    fn from(e: StateTransitionError) -> Self {
        PipelineError::Transition(e)
    }
}

impl From<ChunkCommitFailure> for PipelineError {
    fn from(e: ChunkCommitFailure) -> Self {
        PipelineError::Commit(e)
    }
}

impl From<IntegrityError> for PipelineError {
    fn from(e: IntegrityError) -> Self {
        PipelineError::Integrity(e)
    }
}

impl From<ManifestError> for PipelineError {
    fn from(e: ManifestError) -> Self {
        PipelineError::Manifest(e)
    }
}
