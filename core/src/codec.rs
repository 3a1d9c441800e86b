//! Compress-then-encrypt chunk transform.
//!
//! Design notes:
//! - Fixed write order: compress, then seal. Ciphertext does not compress,
//!   so the inverse order would forfeit all storage savings. Read path is
//!   the exact inverse: open, then decompress.
//! - The codec is stateless across chunks; identity (session id, sequence
//!   number) enters through the nonce schedule and the AAD, so a stored
//!   chunk replayed under another identity fails authentication.
//! - The content hash over raw bytes is computed by the chunker, not here:
//!   integrity proofs stay independent of codec parameters.

use uuid::Uuid;

use crate::chunk::header::{encode_header_le, ChunkFlags, ChunkHeader};
use crate::chunk::{decode_header_le, HeaderError};
use crate::compression::{create_compressor, create_decompressor, CompressionCodec};
use crate::config::PipelineConfig;
use crate::crypto::aad::build_chunk_aad;
use crate::crypto::aead::AeadImpl;
use crate::crypto::digest::HashAlg;
use crate::crypto::kdf::{derive_session_key_32, MasterKey};
use crate::crypto::nonce::derive_nonce_12;
use crate::crypto::types::{CipherSuite, CryptoError, HkdfPrf, SALT_LEN};
use crate::types::{IntegrityError, PipelineError};

/// Per-session cryptographic context: derived key, salt, and suite.
///
/// The derived key never leaves this struct; sessions cannot decrypt each
/// other's chunks even under a shared master key.
#[derive(Clone)]
pub struct SessionCrypto {
    session_id: Uuid,
    suite: CipherSuite,
    salt: [u8; SALT_LEN],
    aead: AeadImpl,
}

impl SessionCrypto {
    /// Derive the session context from the shared master key.
    pub fn derive(
        master_key: &MasterKey,
        session_id: Uuid,
        suite: CipherSuite,
        prf: HkdfPrf,
        salt: [u8; SALT_LEN],
    ) -> Result<Self, CryptoError> {
        let key = derive_session_key_32(master_key, &salt, session_id, suite, prf)?;
        let aead = AeadImpl::new(suite, &key)?;
        Ok(Self { session_id, suite, salt, aead })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }
}

/// Stateless chunk transform: `decode(encode(x)) == x` for every byte
/// sequence, including the empty one.
pub struct ChunkCodec {
    compression: CompressionCodec,
    compression_level: i32,
    content_hash_alg: HashAlg,
    crypto: SessionCrypto,
}

impl ChunkCodec {
    pub fn new(config: &PipelineConfig, crypto: SessionCrypto) -> Self {
        Self::from_parts(
            config.compression,
            config.compression_level,
            config.content_hash,
            crypto,
        )
    }

    /// Construct from explicit parts (read-side callers recover them from
    /// a stored chunk header).
    pub fn from_parts(
        compression: CompressionCodec,
        compression_level: i32,
        content_hash_alg: HashAlg,
        crypto: SessionCrypto,
    ) -> Self {
        Self {
            compression,
            compression_level,
            content_hash_alg,
            crypto,
        }
    }

    /// Transform raw chunk bytes into the stored payload
    /// (header || ciphertext).
    pub fn encode(
        &self,
        sequence_number: u64,
        raw: &[u8],
        final_chunk: bool,
    ) -> Result<Vec<u8>, PipelineError> {
        let mut compressed = Vec::with_capacity(raw.len() / 2 + 16);
        create_compressor(self.compression, Some(self.compression_level))?
            .compress_chunk(raw, &mut compressed)?;

        let mut header = ChunkHeader::new(
            self.crypto.suite,
            self.compression,
            self.content_hash_alg,
            sequence_number,
            raw.len() as u32,
            self.crypto.salt,
        );
        if final_chunk {
            header.flags |= ChunkFlags::FINAL_CHUNK;
        }

        let nonce = derive_nonce_12(&self.crypto.salt, sequence_number)
            .map_err(CryptoError::from)?;
        let aad = build_chunk_aad(self.crypto.session_id, &header);
        let ciphertext = self.crypto.aead.seal(&nonce, &aad, &compressed)?;

        header.ct_len = ciphertext.len() as u32;

        let mut stored = Vec::with_capacity(ChunkHeader::LEN + ciphertext.len());
        stored.extend_from_slice(&encode_header_le(&header));
        stored.extend_from_slice(&ciphertext);
        Ok(stored)
    }

    /// Inverse transform: parse and validate the header, open the
    /// ciphertext, decompress.
    ///
    /// Tampering (tag or checksum mismatch) surfaces as `IntegrityError`;
    /// the manifest's raw-byte content hashes are unaffected, so proofs
    /// for other chunks remain valid.
    pub fn decode(
        &self,
        expected_sequence: u64,
        stored: &[u8],
    ) -> Result<Vec<u8>, PipelineError> {
        let header = decode_header_le(stored)?;

        if header.sequence_number != expected_sequence {
            return Err(IntegrityError::SequenceMismatch {
                expected: expected_sequence,
                found: header.sequence_number,
            }
            .into());
        }
        if header.cipher != self.crypto.suite as u16 {
            return Err(HeaderError::UnknownCipherSuite { raw: header.cipher }.into());
        }

        let body = &stored[ChunkHeader::LEN..];
        if body.len() != header.ct_len as usize {
            return Err(PipelineError::Validation(format!(
                "stored body length {} != header ct_len {}",
                body.len(),
                header.ct_len
            )));
        }

        let nonce = derive_nonce_12(&header.salt, header.sequence_number)
            .map_err(CryptoError::from)?;
        let aad = build_chunk_aad(self.crypto.session_id, &header);
        let compressed = self
            .crypto
            .aead
            .open(&nonce, &aad, body)
            .map_err(|e| match e {
                CryptoError::TagMismatch => PipelineError::Integrity(
                    IntegrityError::TagMismatch { sequence_number: expected_sequence },
                ),
                other => PipelineError::Crypto(other),
            })?;

        let codec = CompressionCodec::try_from(header.compression)
            .map_err(|_| HeaderError::UnknownCompression { raw: header.compression })?;
        let mut raw = Vec::with_capacity(header.raw_len as usize);
        create_decompressor(codec)?
            .decompress_chunk(&compressed, &mut raw)
            .map_err(|e| match e {
                crate::compression::CompressionError::ChecksumMismatch { .. } => {
                    PipelineError::Integrity(IntegrityError::ChecksumMismatch {
                        sequence_number: expected_sequence,
                    })
                }
                other => PipelineError::Compression(other),
            })?;

        if raw.len() != header.raw_len as usize {
            return Err(PipelineError::Validation(format!(
                "decoded length {} != header raw_len {}",
                raw.len(),
                header.raw_len
            )));
        }

        Ok(raw)
    }
}
