pub mod counters;
pub mod snapshot;
pub mod timers;

pub use counters::ChunkCounters;
pub use snapshot::SessionTelemetry;
pub use timers::{Stage, StageTimes, StintTimer};
