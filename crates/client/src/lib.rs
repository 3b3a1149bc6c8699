//! Client-side upload scheduler.
//!
//! Splits a file into chunks, uploads them concurrently through a bounded
//! worker pool, retries transient failures with a fixed backoff schedule,
//! and supports cooperative pause/resume: pausing stops workers from
//! claiming new chunks while in-flight requests finish, and resuming
//! re-handshakes with the server to upload exactly what is still missing.
//!
//! Progress is reported over an event channel; see [`UploadEvent`].

mod events;
mod scheduler;
mod transport;

pub use events::{ChunkState, UploadEvent};
pub use scheduler::{Uploader, UploaderConfig, UploadOutcome};
pub use transport::{HttpTransport, Transport, TransportError, TransportFuture};

/// Errors surfaced by an upload attempt.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot upload an empty file")]
    EmptyFile,

    #[error("chunk read error: {0}")]
    Transfer(#[from] cargohold_transfer::TransferError),

    #[error("session init failed: {0}")]
    Handshake(String),

    #[error("upload session lost: {0}")]
    SessionGone(String),

    #[error("upload failed for chunk indices {indices:?}")]
    ChunksFailed { indices: Vec<u32> },

    #[error("internal error: {0}")]
    Internal(String),
}
