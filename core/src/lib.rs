//! capture-core
//!
//! Pure Rust session recording evidence pipeline: fixed-size chunking,
//! compress-then-encrypt sealing, Merkle integrity manifests, and an
//! explicit session lifecycle state machine.

#![forbid(unsafe_code)]

// Shared and top level
pub mod config;
pub mod constants;
pub mod retry;
pub mod types;
pub mod utils;

// Transform layers
pub mod compression;
pub mod crypto;

// Chunk pipeline
pub mod chunk;
pub mod chunker;
pub mod codec;
pub mod merkle;
pub mod store;

// Lifecycle and collaborators
pub mod external;
pub mod session;
pub mod telemetry;
pub mod verify;

// -----------------------------------------------------------------------------
// Prelude
// -----------------------------------------------------------------------------
pub mod prelude {
    pub use crate::chunk::ChunkRecord;
    pub use crate::config::PipelineConfig;
    pub use crate::crypto::kdf::MasterKey;
    pub use crate::external::{
        AllowAllAuth, AnchorReceipt, AnchorSink, AuthService, NullAnchorSink, ReaderSource,
        SessionSource,
    };
    pub use crate::session::{
        Manifest, SessionEvent, SessionPipeline, SessionRecord, SessionState,
    };
    pub use crate::store::{
        ChunkStore, MemoryChunkStore, MemoryMetadataStore, MetadataStore, StorageRef,
    };
    pub use crate::types::{IntegrityError, PipelineError};
    pub use crate::verify::SessionVerifier;
}
