//! Wire types for the cargohold upload API.
//!
//! Shared by the server handlers and the client transport so both sides
//! agree on field names. All bodies are JSON with camelCase keys.

mod messages;
mod types;

pub use messages::{
    ArchiveEntry, ChunkAck, ContentsResponse, ErrorResponse, InitUploadRequest,
    InitUploadResponse, StatusResponse, UploadProgress,
};
pub use types::{ChunkStatus, SessionStatus};
