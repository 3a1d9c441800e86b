//! crypto/digest.rs
//! Content hash registry used for Merkle leaves and interior nodes.
//!
//! The content hash covers the *raw* (pre-transform) chunk bytes, so
//! integrity proofs stay valid across codec or cipher changes.

use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::constants::hash_ids;

/// 32-byte content hash (Merkle leaf / node value).
pub type ContentHash = [u8; 32];

/// Supported content hash algorithms.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive, Serialize, Deserialize)]
pub enum HashAlg {
    Sha256 = hash_ids::SHA256,
    Blake3 = hash_ids::BLAKE3,
}

impl HashAlg {
    pub fn verify(raw: u16) -> Result<(), DigestError> {
        HashAlg::try_from(raw)
            .map(|_| ())
            .map_err(|_| DigestError::UnknownAlgorithm(raw))
    }
}

/// Digest-related errors.
#[derive(Debug)]
pub enum DigestError {
    UnknownAlgorithm(u16),
}

impl std::fmt::Display for DigestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DigestError::UnknownAlgorithm(raw) =>
                write!(f, "unknown hash algorithm: 0x{:04x}", raw),
        }
    }
}

impl std::error::Error for DigestError {}

/// Hash one byte buffer with the selected algorithm.
#[inline]
pub fn content_hash_32(alg: HashAlg, data: &[u8]) -> ContentHash {
    match alg {
        HashAlg::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(data);
            hasher.finalize().into()
        }
        HashAlg::Blake3 => *blake3::hash(data).as_bytes(),
    }
}

/// Hash the concatenation of two 32-byte nodes (Merkle interior hash).
#[inline]
pub fn hash_pair_32(alg: HashAlg, left: &ContentHash, right: &ContentHash) -> ContentHash {
    match alg {
        HashAlg::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(left);
            hasher.update(right);
            hasher.finalize().into()
        }
        HashAlg::Blake3 => {
            let mut hasher = blake3::Hasher::new();
            hasher.update(left);
            hasher.update(right);
            *hasher.finalize().as_bytes()
        }
    }
}
