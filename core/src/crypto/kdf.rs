//! crypto/kdf.rs
//! HKDF-based per-session key derivation from the master key and the
//! session's random salt.
//!
//! Design:
//! - HKDF-Extract(master_key, salt) -> PRK
//! - HKDF-Expand(PRK, info) -> 32-byte session key
//! - 'info' binds the session identity and cipher configuration, so the
//!   same master key yields unrelated keys for different sessions or
//!   suite choices.
//!
//! Never use the master key directly for AEAD; always derive.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hkdf::Hkdf;
use sha2::{Sha256, Sha512};
use uuid::Uuid;

use crate::crypto::types::{CipherSuite, CryptoError, HkdfPrf, KEY_LEN_32, SALT_LEN};

/// Domain separation label for session key expansion.
const KDF_INFO_LABEL: &[u8] = b"RSC1|SESSION-KEY";

/// Master key material shared across sessions.
///
/// Sessions never see this directly; they receive a derived key bound to
/// their own identity.
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN_32],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN_32]) -> Self {
        Self { bytes }
    }

    /// Decode from a base64 configuration value (exactly 32 bytes once
    /// decoded).
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let raw = BASE64
            .decode(encoded.trim())
            .map_err(|e| CryptoError::Failure(format!("master key base64: {}", e)))?;
        if raw.len() != KEY_LEN_32 {
            return Err(CryptoError::InvalidKeyLen {
                expected: KEY_LEN_32,
                actual: raw.len(),
            });
        }
        let mut bytes = [0u8; KEY_LEN_32];
        bytes.copy_from_slice(&raw);
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN_32] {
        &self.bytes
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.write_str("MasterKey(..)")
    }
}

/// Build the HKDF 'info' binding session identity and configuration:
/// label, session_id, cipher suite id, PRF id.
#[inline]
fn build_info(session_id: Uuid, suite: CipherSuite, prf: HkdfPrf) -> Vec<u8> {
    let mut info = Vec::with_capacity(KDF_INFO_LABEL.len() + 16 + 4);
    info.extend_from_slice(KDF_INFO_LABEL);
    info.extend_from_slice(session_id.as_bytes());
    info.extend_from_slice(&(suite as u16).to_le_bytes());
    info.extend_from_slice(&(prf as u16).to_le_bytes());
    info
}

/// Derive the 32-byte per-session key via HKDF from master key + salt.
///
/// Errors:
/// - All-zero salt is rejected (it would defeat per-session uniqueness).
/// - HKDF expand failures map to `CryptoError::Failure`.
#[inline]
pub fn derive_session_key_32(
    master_key: &MasterKey,
    salt: &[u8; SALT_LEN],
    session_id: Uuid,
    suite: CipherSuite,
    prf: HkdfPrf,
) -> Result<[u8; KEY_LEN_32], CryptoError> {
    if salt.iter().all(|&b| b == 0) {
        return Err(CryptoError::Failure("salt must not be all-zero".into()));
    }

    let info = build_info(session_id, suite, prf);
    let mut key = [0u8; KEY_LEN_32];

    match prf {
        HkdfPrf::Sha256 => {
            let hk = Hkdf::<Sha256>::new(Some(salt), master_key.as_bytes());
            hk.expand(&info, &mut key)
                .map_err(|_| CryptoError::Failure("HKDF expand failed (SHA-256)".into()))?;
        }
        HkdfPrf::Sha512 => {
            let hk = Hkdf::<Sha512>::new(Some(salt), master_key.as_bytes());
            hk.expand(&info, &mut key)
                .map_err(|_| CryptoError::Failure("HKDF expand failed (SHA-512)".into()))?;
        }
    }

    Ok(key)
}
