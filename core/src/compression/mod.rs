//! compression/mod.rs
//! Deterministic per-chunk compression and decompression.
//!
//! Design notes:
//! - Each chunk compresses independently (no frame-spanning state), so a
//!   single corrupt chunk never poisons its neighbors and chunks decode
//!   in isolation.
//! - Every codec emits `[raw_len: u32 LE][codec output][crc32(raw): u32 LE]`;
//!   the CRC is a cheap decode-time sanity check beneath the AEAD tag.
//! - The registry resolves codec IDs to implementations.

pub mod codecs;
pub mod registry;
pub mod types;

pub use registry::*;
pub use types::*;

/// CRC32 over the raw (uncompressed) bytes.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub fn verify_checksum(expected: u32, actual: u32, codec: &str) -> Result<(), CompressionError> {
    if expected != actual {
        return Err(CompressionError::ChecksumMismatch {
            codec: codec.into(),
            expected,
            actual,
        });
    }
    Ok(())
}
