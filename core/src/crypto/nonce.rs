//! crypto/nonce.rs
//! Deterministic nonce derivation from the session salt and chunk
//! sequence number.
//!
//! Design:
//! - TLS-like schedule: the first 12 bytes of the session salt form the
//!   base IV; the low 8 bytes are XORed with the little-endian sequence
//!   number. Fixed 4-byte prefix, varying 8-byte tail: 2^64 nonces per
//!   session.
//! - The schedule must be identical on encode and decode; nonces are
//!   recomputed on read, never persisted.
//!
//! Security notes:
//! - Never reuse the same (salt, sequence) pair. The salt must be random
//!   per session; all-zero salts are rejected.

use crate::crypto::types::{NonceError, NONCE_LEN_12, SALT_LEN};

/// Derive the 12-byte AEAD nonce for one chunk.
///
/// Deterministic mapping: same `(salt, sequence_number)` -> same nonce;
/// distinct sequence numbers yield distinct nonces within a session.
#[inline]
pub fn derive_nonce_12(
    salt: &[u8; SALT_LEN],
    sequence_number: u64,
) -> Result<[u8; NONCE_LEN_12], NonceError> {
    validate_salt(salt)?;

    let mut nonce = [0u8; NONCE_LEN_12];
    nonce.copy_from_slice(&salt[..NONCE_LEN_12]);

    let ctr = sequence_number.to_le_bytes();
    for j in 0..8 {
        nonce[4 + j] ^= ctr[j];
    }

    Ok(nonce)
}

/// Validate that a session salt is not all zeros.
#[inline]
pub fn validate_salt(salt: &[u8; SALT_LEN]) -> Result<(), NonceError> {
    if salt.iter().all(|&b| b == 0) {
        return Err(NonceError::InvalidSalt);
    }
    Ok(())
}

/// Generate a fresh random session salt (guaranteed non-zero).
pub fn generate_salt() -> [u8; SALT_LEN] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LEN];
    loop {
        rand::thread_rng().fill_bytes(&mut salt);
        if salt.iter().any(|&b| b != 0) {
            return salt;
        }
    }
}
