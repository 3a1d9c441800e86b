pub mod machine;
pub mod manifest;
pub mod record;
pub mod state;

pub use machine::SessionPipeline;
pub use manifest::{ChunkIndexEntry, Manifest, ManifestError, SessionManifestWriter};
pub use record::{FailureReport, SessionRecord};
pub use state::{transition, SessionEvent, SessionState, StateTransitionError};
