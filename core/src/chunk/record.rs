//! chunk/record.rs
//! Committed chunk metadata.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::digest::ContentHash;
use crate::store::StorageRef;

/// One committed chunk of a session, emitted by the chunker after the
/// encode/store round-trip succeeds. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub session_id: Uuid,
    /// 0-based, contiguous, unique per session.
    pub sequence_number: u64,
    /// Pre-transform byte length.
    pub raw_size: u64,
    /// Post-transform (header + ciphertext) byte length.
    pub stored_size: u64,
    /// Hash of the raw bytes; the Merkle leaf for this chunk.
    #[serde(with = "serde_bytes_hash")]
    pub content_hash: ContentHash,
    /// Opaque locator into the chunk store.
    pub storage_ref: StorageRef,
}

/// Hex (de)serialization for 32-byte hashes: JSON manifests stay readable
/// and diffable.
pub(crate) mod serde_bytes_hash {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &[u8; 32], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(de)?;
        let raw = hex::decode(&s).map_err(de::Error::custom)?;
        raw.as_slice()
            .try_into()
            .map_err(|_| de::Error::custom(format!("expected 32 hash bytes, got {}", raw.len())))
    }
}
