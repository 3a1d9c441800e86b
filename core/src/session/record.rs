//! session/record.rs
//! Persistent session document and failure report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::digest::ContentHash;
use crate::session::state::SessionState;
use crate::telemetry::SessionTelemetry;

/// One recorded remote-desktop session.
///
/// Invariants: `merkle_root` is present iff the state is a terminal
/// success; `chunk_count` never decreases; sequence numbers are
/// contiguous from 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    /// Opaque principal identifier from the auth collaborator.
    pub owner_id: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    /// Unset until a terminal state is reached.
    pub ended_at: Option<DateTime<Utc>>,
    /// Count of finalized chunks; owned by the chunker while capturing.
    pub chunk_count: u64,
    pub total_raw_bytes: u64,
    /// Set exactly once, at finalization.
    #[serde(default, with = "serde_opt_hash")]
    pub merkle_root: Option<ContentHash>,
    /// Present iff the session failed.
    pub failure: Option<FailureReport>,
    /// Snapshot of pipeline work, set at finalization or failure.
    pub telemetry: Option<SessionTelemetry>,
}

impl SessionRecord {
    pub fn new(session_id: Uuid, owner_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            owner_id,
            state: SessionState::Initializing,
            started_at,
            ended_at: None,
            chunk_count: 0,
            total_raw_bytes: 0,
            merkle_root: None,
            failure: None,
            telemetry: None,
        }
    }
}

/// What a failed session exposes so a new session can resume capture
/// past the committed prefix at a higher layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Last durably committed sequence number; `None` when the session
    /// failed before any chunk committed.
    pub last_committed_sequence: Option<u64>,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Optional-hash (de)serialization as hex, mirroring the chunk record
/// convention.
mod serde_opt_hash {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        hash: &Option<[u8; 32]>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        match hash {
            Some(h) => ser.serialize_some(&hex::encode(h)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<[u8; 32]>, D::Error> {
        let opt: Option<String> = Option::deserialize(de)?;
        match opt {
            None => Ok(None),
            Some(s) => {
                let raw = hex::decode(&s).map_err(de::Error::custom)?;
                raw.as_slice()
                    .try_into()
                    .map(Some)
                    .map_err(|_| {
                        de::Error::custom(format!("expected 32 hash bytes, got {}", raw.len()))
                    })
            }
        }
    }
}
