//! Process-wide pipeline configuration.
//!
//! Design notes:
//! - One explicit struct passed into each pipeline instance at construction,
//!   never ambient globals. Tests and deployments override per instance.
//! - Registry enums (cipher, codec, hash) are configured here and mirrored
//!   into every chunk header so stored chunks stay self-describing.

use std::time::Duration;

use crate::compression::CompressionCodec;
use crate::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_COMMIT_BACKOFF_BASE, DEFAULT_COMMIT_BACKOFF_MAX,
    DEFAULT_COMPRESSION_LEVEL, DEFAULT_MAX_COMMIT_RETRIES, DEFAULT_TRANSITION_LOCK_TIMEOUT,
    MAX_CHUNK_SIZE,
};
use crate::crypto::digest::HashAlg;
use crate::crypto::{CipherSuite, HkdfPrf};

/// Configuration for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Size of one chunk of the raw stream. The final chunk may be shorter;
    /// a zero-length trailing chunk is never emitted.
    pub chunk_size_bytes: usize,

    /// Compression codec applied before encryption.
    pub compression: CompressionCodec,

    /// Level handed to the codec (codec-specific range).
    pub compression_level: i32,

    /// AEAD cipher suite sealing each compressed chunk.
    pub cipher: CipherSuite,

    /// PRF for per-session key derivation.
    pub hkdf_prf: HkdfPrf,

    /// Hash over raw chunk bytes; doubles as the Merkle node hash.
    pub content_hash: HashAlg,

    /// Bounded retry budget for a single chunk commit (codec + store).
    pub max_commit_retries: u32,

    /// Base delay of the exponential commit backoff schedule.
    pub commit_backoff_base: Duration,

    /// Cap for a single commit backoff delay.
    pub commit_backoff_max: Duration,

    /// How long a transition request waits on a session's in-flight
    /// transition before failing as busy.
    pub transition_lock_timeout: Duration,

    /// Maximum SUSPENDING -> ACTIVE resume cycles; `None` means unlimited.
    pub max_resume_cycles: Option<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            compression: CompressionCodec::Zstd,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            cipher: CipherSuite::Chacha20Poly1305,
            hkdf_prf: HkdfPrf::Sha256,
            content_hash: HashAlg::Sha256,
            max_commit_retries: DEFAULT_MAX_COMMIT_RETRIES,
            commit_backoff_base: DEFAULT_COMMIT_BACKOFF_BASE,
            commit_backoff_max: DEFAULT_COMMIT_BACKOFF_MAX,
            transition_lock_timeout: DEFAULT_TRANSITION_LOCK_TIMEOUT,
            max_resume_cycles: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size_bytes == 0 {
            return Err(ConfigError::InvalidChunkSizeZero);
        }
        if self.chunk_size_bytes > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidChunkSizeTooLarge {
                have: self.chunk_size_bytes,
                max: MAX_CHUNK_SIZE,
            });
        }
        if self.max_commit_retries == 0 {
            return Err(ConfigError::InvalidRetryBudgetZero);
        }
        if self.commit_backoff_base > self.commit_backoff_max {
            return Err(ConfigError::InvalidBackoffRange {
                base: self.commit_backoff_base,
                max: self.commit_backoff_max,
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    /// chunk_size_bytes must be nonzero.
    InvalidChunkSizeZero,

    /// chunk_size_bytes exceeds the sanity bound.
    InvalidChunkSizeTooLarge { have: usize, max: usize },

    /// At least one commit attempt is required.
    InvalidRetryBudgetZero,

    /// Backoff base must not exceed the backoff cap.
    InvalidBackoffRange { base: Duration, max: Duration },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ConfigError::*;
        match self {
            InvalidChunkSizeZero =>
                write!(f, "invalid chunk_size_bytes: zero"),
            InvalidChunkSizeTooLarge { have, max } =>
                write!(f, "invalid chunk_size_bytes: {} > {}", have, max),
            InvalidRetryBudgetZero =>
                write!(f, "invalid max_commit_retries: zero"),
            InvalidBackoffRange { base, max } =>
                write!(f, "invalid backoff range: base {:?} > max {:?}", base, max),
        }
    }
}

impl std::error::Error for ConfigError {}
