//! telemetry/snapshot.rs
//! Immutable per-session telemetry derived at stint end.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::telemetry::counters::ChunkCounters;
use crate::telemetry::timers::{StageTimes, StintTimer};

/// Snapshot of one session's pipeline work: counters, ratios, throughput,
/// stage timings, elapsed duration. Serializable for operational export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTelemetry {
    pub chunks_committed: u64,
    pub commit_retries: u64,
    pub bytes_raw: u64,
    pub bytes_stored: u64,
    /// stored/raw; below 1.0 means compression won despite AEAD overhead.
    pub storage_ratio: f64,
    pub throughput_raw_bytes_per_sec: f64,
    pub elapsed: Duration,
    pub stage_times: StageTimes,
}

impl SessionTelemetry {
    pub fn from(counters: &ChunkCounters, timer: &StintTimer) -> Self {
        let elapsed = timer.elapsed();

        let storage_ratio = if counters.bytes_raw > 0 {
            counters.bytes_stored as f64 / counters.bytes_raw as f64
        } else {
            0.0
        };

        let throughput = if elapsed.as_secs_f64() > 0.0 {
            counters.bytes_raw as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        Self {
            chunks_committed: counters.chunks_committed,
            commit_retries: counters.commit_retries,
            bytes_raw: counters.bytes_raw,
            bytes_stored: counters.bytes_stored,
            storage_ratio,
            throughput_raw_bytes_per_sec: throughput,
            elapsed,
            stage_times: timer.stage_times.clone(),
        }
    }

    pub fn total_stage_time(&self) -> Duration {
        self.stage_times.total()
    }
}
