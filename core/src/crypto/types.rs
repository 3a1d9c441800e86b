//! crypto/types.rs
//! Cipher and PRF registries, key/nonce sizes, and crypto error types.

use std::fmt;

use num_enum::TryFromPrimitive;

use crate::constants::{cipher_ids, prf_ids};
use crate::utils::enum_name_or_hex;

/// Stable session key size.
pub const KEY_LEN_32: usize = 32;

/// Standard 12-byte nonce length for AES-GCM and ChaCha20-Poly1305.
pub const NONCE_LEN_12: usize = 12;

/// Fixed AEAD tag length (bytes).
pub const TAG_LEN: usize = 16;

/// Per-session salt length (nonce base, random per session).
pub const SALT_LEN: usize = 16;

/// Cipher suites (chunk header registry).
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
pub enum CipherSuite {
    Aes256Gcm        = cipher_ids::AES256_GCM,
    Chacha20Poly1305 = cipher_ids::CHACHA20_POLY1305,
}

impl CipherSuite {
    pub fn verify(raw: u16) -> Result<(), CryptoError> {
        match raw {
            x if x == CipherSuite::Aes256Gcm as u16        => Ok(()),
            x if x == CipherSuite::Chacha20Poly1305 as u16 => Ok(()),
            _ => Err(CryptoError::UnsupportedCipher { cipher_id: raw }),
        }
    }
}

/// HKDF PRF choices (session key derivation registry).
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
pub enum HkdfPrf {
    Sha256 = prf_ids::SHA256,
    Sha512 = prf_ids::SHA512,
}

impl HkdfPrf {
    pub fn verify(raw: u16) -> Result<(), CryptoError> {
        match raw {
            x if x == HkdfPrf::Sha256 as u16 => Ok(()),
            x if x == HkdfPrf::Sha512 as u16 => Ok(()),
            _ => Err(CryptoError::UnsupportedPrf { prf_id: raw }),
        }
    }
}

#[derive(Debug)]
pub enum NonceError {
    /// Salt is invalid (e.g., all zeros).
    InvalidSalt,

    /// Generic validation or derivation error with context.
    Validation(String),
}

impl fmt::Display for NonceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NonceError::InvalidSalt => write!(f, "invalid salt: all zeros"),
            NonceError::Validation(msg) => write!(f, "nonce validation error: {}", msg),
        }
    }
}

impl std::error::Error for NonceError {}

#[derive(Debug)]
pub enum CryptoError {
    /// Unsupported cipher suite ID.
    UnsupportedCipher { cipher_id: u16 },

    /// Unsupported HKDF PRF selection.
    UnsupportedPrf { prf_id: u16 },

    /// Invalid key length provided to cipher.
    InvalidKeyLen { expected: usize, actual: usize },

    /// Nonce length mismatch (must be 12 bytes for supported ciphers).
    InvalidNonceLen { expected: usize, actual: usize },

    /// AEAD tag mismatch (authentication failure).
    TagMismatch,

    /// General derivation or runtime error with context.
    Failure(String),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CryptoError::*;
        match self {
            UnsupportedCipher { cipher_id } =>
                write!(f, "unsupported cipher suite: {}",
                       enum_name_or_hex::<CipherSuite>(*cipher_id)),
            UnsupportedPrf { prf_id } =>
                write!(f, "unsupported HKDF PRF: {}",
                       enum_name_or_hex::<HkdfPrf>(*prf_id)),
            InvalidKeyLen { expected, actual } =>
                write!(f, "invalid key length: expected={}, actual={}", expected, actual),
            InvalidNonceLen { expected, actual } =>
                write!(f, "invalid nonce length: expected={}, actual={}", expected, actual),
            TagMismatch =>
                write!(f, "AEAD tag mismatch"),
            Failure(msg) =>
                write!(f, "crypto failure: {}", msg),
        }
    }
}

impl std::error::Error for CryptoError {}

impl From<NonceError> for CryptoError {
    fn from(e: NonceError) -> Self {
        CryptoError::Failure(e.to_string())
    }
}
