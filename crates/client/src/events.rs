/// Client-side view of one chunk's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Pending,
    Uploading,
    Success,
    Error,
}

/// Progress notifications emitted by the scheduler.
///
/// Consumers receive these over the channel returned by
/// [`Uploader::take_events`](crate::Uploader::take_events); dropping the
/// receiver silently discards further events without stalling the upload.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Whole-file fingerprint computation started.
    Hashing,
    /// Handshake done; `already_verified` chunks were skipped for resume.
    Initialized {
        upload_id: String,
        already_verified: u32,
        total_chunks: u32,
    },
    ChunkStarted {
        index: u32,
    },
    ChunkCompleted {
        index: u32,
    },
    /// The chunk exhausted its retry budget (or was rejected outright).
    ChunkFailed {
        index: u32,
        error: String,
    },
    Progress {
        completed: u32,
        total: u32,
    },
    Paused {
        completed: u32,
        total: u32,
    },
    Completed {
        upload_id: String,
    },
    Failed {
        error: String,
    },
}
