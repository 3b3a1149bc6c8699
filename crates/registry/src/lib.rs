//! Upload session registry.
//!
//! The authoritative in-memory view of every upload session, mirrored to
//! JSON state files so it can be rebuilt after a restart. Holds the
//! per-session critical section: all mutation of one session's state (chunk
//! acceptance, assembly trigger, expiry) happens under that session's own
//! lock, so different sessions never contend.
//!
//! Three entry points matter to callers:
//! - [`SessionRegistry`]: init/accept/status operations,
//! - [`SessionRegistry::recover`]: startup sweep reconciling state files
//!   against the chunk store,
//! - [`SessionRegistry::spawn_cleanup`]: periodic sweep expiring idle
//!   sessions and reclaiming their storage.

mod cleanup;
mod recovery;
mod registry;
mod session;

pub use cleanup::CleanupStats;
pub use recovery::RecoveryReport;
pub use registry::{AcceptOutcome, RegistryConfig, SessionRegistry, StatusSnapshot};
pub use session::{ChunkSlot, SessionRecord};

/// Errors produced by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("upload session not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("chunk checksum mismatch: supplied {supplied}, computed {computed}")]
    ChecksumMismatch { supplied: String, computed: String },

    #[error("assembly failed: {0}")]
    Assembly(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session state serialization error: {0}")]
    Persist(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
