//! chunk/header.rs
//! Fixed-size binary header prefixed to every stored chunk payload.
//!
//! Industry notes:
//! - Fixed field sizes and little-endian integers give a deterministic,
//!   reproducible wire format.
//! - Reserved bytes allow future fields without changing size; always zero.
//! - The header is authenticated through the chunk AAD, not by inclusion
//!   in the ciphertext; `ct_len` is the one field excluded from the AAD
//!   because it exists only after sealing.

use std::fmt;

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};

use crate::compression::CompressionCodec;
use crate::constants::{CHUNK_FORMAT_V1, MAGIC_RSC1, MAX_CHUNK_SIZE};
use crate::crypto::digest::HashAlg;
use crate::crypto::types::{CipherSuite, SALT_LEN, TAG_LEN};
use crate::utils::{enum_name_or_hex, fmt_bytes};

bitflags! {
    /// Presence and behavior bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChunkFlags: u16 {
        /// Set on the last chunk of a session.
        const FINAL_CHUNK = 0x0001;
    }
}

/// Stored chunk wire header.
///
/// Layout (little-endian, 48 bytes):
///
/// ```text
/// magic            [u8; 4]   "RSC1"
/// version          u16
/// cipher           u16       cipher suite registry id
/// compression      u16       codec registry id
/// content_hash_alg u16       hash registry id
/// flags            u16
/// reserved         u16       must be zero
/// sequence_number  u64
/// raw_len          u32       pre-transform length
/// ct_len           u32       ciphertext length following the header
/// salt             [u8; 16]  per-session nonce base
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkHeader {
    pub magic: [u8; 4],
    pub version: u16,
    pub cipher: u16,
    pub compression: u16,
    pub content_hash_alg: u16,
    pub flags: ChunkFlags,
    pub reserved: u16,
    pub sequence_number: u64,
    pub raw_len: u32,
    pub ct_len: u32,
    pub salt: [u8; SALT_LEN],
}

impl ChunkHeader {
    /// Fixed header size in bytes.
    pub const LEN: usize = 48;

    pub fn new(
        cipher: CipherSuite,
        compression: CompressionCodec,
        content_hash_alg: HashAlg,
        sequence_number: u64,
        raw_len: u32,
        salt: [u8; SALT_LEN],
    ) -> Self {
        Self {
            magic: MAGIC_RSC1,
            version: CHUNK_FORMAT_V1,
            cipher: cipher as u16,
            compression: compression as u16,
            content_hash_alg: content_hash_alg as u16,
            flags: ChunkFlags::empty(),
            reserved: 0,
            sequence_number,
            raw_len,
            ct_len: 0,
            salt,
        }
    }

    pub fn validate(&self) -> Result<(), HeaderError> {
        if self.magic != MAGIC_RSC1 {
            return Err(HeaderError::InvalidMagic {
                have: self.magic,
                need: MAGIC_RSC1,
            });
        }
        if self.version == 0 || self.version > CHUNK_FORMAT_V1 {
            return Err(HeaderError::InvalidVersion { have: self.version });
        }

        CipherSuite::verify(self.cipher)
            .map_err(|_| HeaderError::UnknownCipherSuite { raw: self.cipher })?;
        CompressionCodec::verify(self.compression)
            .map_err(|_| HeaderError::UnknownCompression { raw: self.compression })?;
        HashAlg::verify(self.content_hash_alg)
            .map_err(|_| HeaderError::UnknownHashAlg { raw: self.content_hash_alg })?;

        if self.reserved != 0 {
            return Err(HeaderError::ReservedNonZero { reserved: self.reserved });
        }
        if self.raw_len as usize > MAX_CHUNK_SIZE {
            return Err(HeaderError::RawLenTooLarge {
                have: self.raw_len,
                max: MAX_CHUNK_SIZE as u32,
            });
        }
        if (self.ct_len as usize) < TAG_LEN {
            return Err(HeaderError::CiphertextTooShort {
                have: self.ct_len,
                min: TAG_LEN as u32,
            });
        }
        if self.salt.iter().all(|&b| b == 0) {
            return Err(HeaderError::InvalidSalt { salt: self.salt });
        }

        Ok(())
    }
}

/// Encode a header into its canonical 48-byte wire form.
pub fn encode_header_le(h: &ChunkHeader) -> [u8; ChunkHeader::LEN] {
    let mut buf = [0u8; ChunkHeader::LEN];
    buf[0..4].copy_from_slice(&h.magic);
    LittleEndian::write_u16(&mut buf[4..6], h.version);
    LittleEndian::write_u16(&mut buf[6..8], h.cipher);
    LittleEndian::write_u16(&mut buf[8..10], h.compression);
    LittleEndian::write_u16(&mut buf[10..12], h.content_hash_alg);
    LittleEndian::write_u16(&mut buf[12..14], h.flags.bits());
    LittleEndian::write_u16(&mut buf[14..16], h.reserved);
    LittleEndian::write_u64(&mut buf[16..24], h.sequence_number);
    LittleEndian::write_u32(&mut buf[24..28], h.raw_len);
    LittleEndian::write_u32(&mut buf[28..32], h.ct_len);
    buf[32..48].copy_from_slice(&h.salt);
    buf
}

/// Decode and validate a header from wire bytes.
pub fn decode_header_le(buf: &[u8]) -> Result<ChunkHeader, HeaderError> {
    if buf.len() < ChunkHeader::LEN {
        return Err(HeaderError::BufferTooShort {
            have: buf.len(),
            need: ChunkHeader::LEN,
        });
    }

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&buf[0..4]);
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&buf[32..48]);

    let raw_flags = LittleEndian::read_u16(&buf[12..14]);
    let header = ChunkHeader {
        magic,
        version: LittleEndian::read_u16(&buf[4..6]),
        cipher: LittleEndian::read_u16(&buf[6..8]),
        compression: LittleEndian::read_u16(&buf[8..10]),
        content_hash_alg: LittleEndian::read_u16(&buf[10..12]),
        flags: ChunkFlags::from_bits(raw_flags)
            .ok_or(HeaderError::UnknownFlags { raw: raw_flags })?,
        reserved: LittleEndian::read_u16(&buf[14..16]),
        sequence_number: LittleEndian::read_u64(&buf[16..24]),
        raw_len: LittleEndian::read_u32(&buf[24..28]),
        ct_len: LittleEndian::read_u32(&buf[28..32]),
        salt,
    };

    header.validate()?;
    Ok(header)
}

#[derive(Debug)]
pub enum HeaderError {
    /// Buffer too short to contain a full header.
    BufferTooShort { have: usize, need: usize },

    /// Invalid magic marker (expected "RSC1").
    InvalidMagic { have: [u8; 4], need: [u8; 4] },

    /// Invalid or unsupported format version.
    InvalidVersion { have: u16 },

    /// Unknown or unsupported cipher suite.
    UnknownCipherSuite { raw: u16 },

    /// Unknown or unsupported compression codec.
    UnknownCompression { raw: u16 },

    /// Unknown or unsupported content hash algorithm.
    UnknownHashAlg { raw: u16 },

    /// Unknown flag bits set.
    UnknownFlags { raw: u16 },

    /// Reserved bytes must be zero.
    ReservedNonZero { reserved: u16 },

    /// raw_len exceeds the chunk size sanity bound.
    RawLenTooLarge { have: u32, max: u32 },

    /// ct_len smaller than one AEAD tag.
    CiphertextTooShort { have: u32, min: u32 },

    /// Salt is invalid (all zeros).
    InvalidSalt { salt: [u8; SALT_LEN] },
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use HeaderError::*;
        match self {
            BufferTooShort { have, need } =>
                write!(f, "header buffer too short: {} < {}", have, need),
            InvalidMagic { have, need } =>
                write!(f, "invalid magic: expected {}, got {}", fmt_bytes(need), fmt_bytes(have)),
            InvalidVersion { have } =>
                write!(f, "invalid format version: {}", have),
            UnknownCipherSuite { raw } =>
                write!(f, "unknown cipher suite: {}", enum_name_or_hex::<CipherSuite>(*raw)),
            UnknownCompression { raw } =>
                write!(f, "unknown compression codec: {}",
                       enum_name_or_hex::<CompressionCodec>(*raw)),
            UnknownHashAlg { raw } =>
                write!(f, "unknown hash algorithm: {}", enum_name_or_hex::<HashAlg>(*raw)),
            UnknownFlags { raw } =>
                write!(f, "unknown flag bits: 0x{:04x}", raw),
            ReservedNonZero { reserved } =>
                write!(f, "reserved bytes must be zero, got 0x{:04x}", reserved),
            RawLenTooLarge { have, max } =>
                write!(f, "raw_len too large: {} > {}", have, max),
            CiphertextTooShort { have, min } =>
                write!(f, "ct_len too short: {} < {}", have, min),
            InvalidSalt { salt } =>
                write!(f, "invalid salt: all zeros ({})", fmt_bytes(salt)),
        }
    }
}

impl std::error::Error for HeaderError {}
