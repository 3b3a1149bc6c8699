//! Chunked file transfer primitives.
//!
//! The leaves of the upload pipeline: checksum helpers, chunk layout math,
//! client-side chunk slicing, the server's durable chunk store, and the
//! assembler that concatenates verified chunks back into the final artifact.
//! Everything here is synchronous; async callers wrap the heavier operations
//! in `spawn_blocking`.

mod assemble;
mod checksum;
mod layout;
mod reader;
mod store;
mod validation;

pub use assemble::{AssembleError, assemble_artifact};
pub use checksum::{checksum_bytes, fingerprint_file};
pub use layout::ChunkLayout;
pub use reader::FileChunk;
pub use store::ChunkStore;
pub use validation::validate_filename;

/// Default chunk size: 5 MiB.
///
/// Large enough to keep per-chunk overhead (SHA-256, HTTP round-trip) low,
/// small enough that a retry re-sends a bounded amount of data.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk index {index} out of range (total {total})")]
    IndexOutOfRange { index: u32, total: u32 },

    #[error("chunk size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("invalid filename: {0}")]
    InvalidFilename(String),
}
