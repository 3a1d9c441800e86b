//! Stable registry identifiers and pipeline defaults.

use std::time::Duration;

/// Magic marker for stored chunk payloads.
/// "RSC1" = Recorded Session Chunk v1
pub const MAGIC_RSC1: [u8; 4] = *b"RSC1";
pub const CHUNK_FORMAT_V1: u16 = 1;

/// Default chunk size: one fixed-size slice of the raw session stream.
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024; // 10 MiB

/// Max chunk size sanity bound (64 MiB).
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Default compression level handed to the codec registry.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 6;

/// Default bounded retry budget for a single chunk commit.
pub const DEFAULT_MAX_COMMIT_RETRIES: u32 = 3;

/// Base delay for the exponential commit backoff schedule.
pub const DEFAULT_COMMIT_BACKOFF_BASE: Duration = Duration::from_millis(50);

/// Upper bound for a single commit backoff delay.
pub const DEFAULT_COMMIT_BACKOFF_MAX: Duration = Duration::from_secs(5);

/// How long a transition request waits for another in-flight transition
/// on the same session before failing as busy.
pub const DEFAULT_TRANSITION_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Cipher suite identifiers (mirrored in chunk headers).
pub mod cipher_ids {
    pub const AES256_GCM: u16        = 0x0001;
    pub const CHACHA20_POLY1305: u16 = 0x0002;
}

/// HKDF PRF identifiers (session key derivation).
pub mod prf_ids {
    pub const SHA256: u16 = 0x0001;
    pub const SHA512: u16 = 0x0002;
}

/// Compression codec identifiers (mirrored in chunk headers).
pub mod codec_ids {
    pub const ZSTD: u16    = 0x0001;
    pub const LZ4: u16     = 0x0002;
    pub const DEFLATE: u16 = 0x0003;
}

/// Content hash identifiers (Merkle leaves and interior nodes).
pub mod hash_ids {
    pub const SHA256: u16 = 0x0001;
    pub const BLAKE3: u16 = 0x0002;
}
