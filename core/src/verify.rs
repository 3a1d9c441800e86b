//! Read-side verification: fetch, decode, and re-check committed chunks
//! against a finalized manifest.
//!
//! Design notes:
//! - Verifiers recover the session salt and suite from the stored chunk
//!   header, derive the session key from the master key, and decode.
//! - Integrity failures are always surfaced. A single corrupted chunk
//!   fails its own read; the manifest's raw-byte hashes keep every other
//!   chunk's proof valid.

use tracing::debug;
use uuid::Uuid;

use crate::chunk::{decode_header_le, HeaderError};
use crate::codec::{ChunkCodec, SessionCrypto};
use crate::compression::CompressionCodec;
use crate::crypto::digest::{content_hash_32, HashAlg};
use crate::crypto::kdf::MasterKey;
use crate::crypto::types::{CipherSuite, HkdfPrf};
use crate::merkle::{compute_root, verify_inclusion, InclusionProof, MerkleTreeBuilder};
use crate::session::manifest::{ChunkIndexEntry, Manifest, EMPTY_SESSION_ROOT};
use crate::store::ChunkStore;
use crate::types::{IntegrityError, PipelineError};

/// Verifies stored chunks and manifests for one session.
pub struct SessionVerifier<'a> {
    master_key: &'a MasterKey,
    hkdf_prf: HkdfPrf,
    chunk_store: &'a dyn ChunkStore,
}

impl<'a> SessionVerifier<'a> {
    pub fn new(
        master_key: &'a MasterKey,
        hkdf_prf: HkdfPrf,
        chunk_store: &'a dyn ChunkStore,
    ) -> Self {
        Self {
            master_key,
            hkdf_prf,
            chunk_store,
        }
    }

    /// Fetch and decode one chunk, re-checking its content hash against
    /// the manifest entry.
    pub fn read_chunk(
        &self,
        session_id: Uuid,
        entry: &ChunkIndexEntry,
    ) -> Result<Vec<u8>, PipelineError> {
        let stored = self.chunk_store.get(&entry.storage_ref)?;
        let header = decode_header_le(&stored)?;

        let suite = CipherSuite::try_from(header.cipher)
            .map_err(|_| HeaderError::UnknownCipherSuite { raw: header.cipher })?;
        let compression = CompressionCodec::try_from(header.compression)
            .map_err(|_| HeaderError::UnknownCompression { raw: header.compression })?;
        let hash_alg = HashAlg::try_from(header.content_hash_alg)
            .map_err(|_| HeaderError::UnknownHashAlg { raw: header.content_hash_alg })?;

        let crypto = SessionCrypto::derive(
            self.master_key,
            session_id,
            suite,
            self.hkdf_prf,
            header.salt,
        )?;
        let codec = ChunkCodec::from_parts(compression, 0, hash_alg, crypto);

        let raw = codec.decode(entry.sequence_number, &stored)?;

        let actual = content_hash_32(hash_alg, &raw);
        if actual != entry.content_hash {
            return Err(IntegrityError::ContentHashMismatch {
                sequence_number: entry.sequence_number,
                expected: entry.content_hash,
                actual,
            }
            .into());
        }

        Ok(raw)
    }

    /// Re-check the manifest's internal consistency: contiguous sequence
    /// numbers and a Merkle root matching the chunk index. Does not touch
    /// the chunk store.
    pub fn verify_manifest(&self, manifest: &Manifest) -> Result<(), PipelineError> {
        for (i, entry) in manifest.chunk_index.iter().enumerate() {
            if entry.sequence_number != i as u64 {
                return Err(IntegrityError::SequenceMismatch {
                    expected: i as u64,
                    found: entry.sequence_number,
                }
                .into());
            }
        }
        if manifest.chunk_index.len() as u64 != manifest.chunk_count {
            return Err(PipelineError::Validation(format!(
                "chunk_count {} != index length {}",
                manifest.chunk_count,
                manifest.chunk_index.len()
            )));
        }

        let actual = if manifest.chunk_index.is_empty() {
            EMPTY_SESSION_ROOT
        } else {
            let leaves: Vec<_> = manifest
                .chunk_index
                .iter()
                .map(|entry| entry.content_hash)
                .collect();
            compute_root(manifest.content_hash_alg, &leaves)?
        };

        if actual != manifest.merkle_root {
            return Err(IntegrityError::RootMismatch {
                expected: manifest.merkle_root,
                actual,
            }
            .into());
        }

        Ok(())
    }

    /// Deep verification: `verify_manifest` plus a fetch-decode-rehash of
    /// every chunk. Returns total raw bytes verified.
    pub fn verify_session(&self, manifest: &Manifest) -> Result<u64, PipelineError> {
        self.verify_manifest(manifest)?;

        let mut total = 0u64;
        for entry in &manifest.chunk_index {
            let raw = self.read_chunk(manifest.session_id, entry)?;
            total += raw.len() as u64;
        }

        if total != manifest.total_raw_bytes {
            return Err(PipelineError::Validation(format!(
                "verified byte count {} != manifest total_raw_bytes {}",
                total, manifest.total_raw_bytes
            )));
        }

        debug!(
            session = %manifest.session_id,
            chunks = manifest.chunk_count,
            bytes = total,
            "session verified"
        );
        Ok(total)
    }

    /// Produce an inclusion proof for one chunk from the manifest's index.
    pub fn inclusion_proof(
        &self,
        manifest: &Manifest,
        sequence_number: u64,
    ) -> Result<InclusionProof, PipelineError> {
        let mut tree = MerkleTreeBuilder::new(manifest.content_hash_alg);
        for entry in &manifest.chunk_index {
            tree.append(entry.content_hash);
        }
        Ok(tree.proof(sequence_number)?)
    }

    /// Check one chunk's membership holding only the root and its hash.
    pub fn verify_chunk_inclusion(
        &self,
        manifest: &Manifest,
        leaf: &crate::crypto::digest::ContentHash,
        proof: &InclusionProof,
    ) -> bool {
        verify_inclusion(manifest.content_hash_alg, &manifest.merkle_root, leaf, proof)
    }
}
