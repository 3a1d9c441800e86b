//! crypto/aad.rs
//! Canonical AAD construction for chunk sealing.
//!
//! AAD = session identity + chunk header invariants known *before*
//! encryption. `ct_len` is excluded (it exists only after sealing).
//! A stored chunk replayed under another session or sequence number
//! fails tag verification.

use uuid::Uuid;

use crate::chunk::header::ChunkHeader;

/// Fixed AAD length: header invariants (42 bytes) + session id (16 bytes).
pub const CHUNK_AAD_LEN: usize = 42 + 16;

/// Build the deterministic AAD for one chunk.
///
/// Layout (little-endian):
///
/// ```text
/// magic            [u8; 4]
/// version          u16
/// cipher           u16
/// compression      u16
/// content_hash_alg u16
/// flags            u16
/// sequence_number  u64
/// raw_len          u32
/// salt             [u8; 16]
/// session_id       [u8; 16]
/// ```
#[inline]
pub fn build_chunk_aad(session_id: Uuid, header: &ChunkHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(CHUNK_AAD_LEN);

    out.extend_from_slice(&header.magic);
    out.extend_from_slice(&header.version.to_le_bytes());
    out.extend_from_slice(&header.cipher.to_le_bytes());
    out.extend_from_slice(&header.compression.to_le_bytes());
    out.extend_from_slice(&header.content_hash_alg.to_le_bytes());
    out.extend_from_slice(&header.flags.bits().to_le_bytes());
    out.extend_from_slice(&header.sequence_number.to_le_bytes());
    out.extend_from_slice(&header.raw_len.to_le_bytes());
    out.extend_from_slice(&header.salt);
    out.extend_from_slice(session_id.as_bytes());

    debug_assert_eq!(out.len(), CHUNK_AAD_LEN);
    out
}
