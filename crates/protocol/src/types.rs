use serde::{Deserialize, Serialize};

/// Lifecycle state of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, no chunk accepted yet.
    Initialized,
    /// At least one chunk verified, not yet complete.
    Uploading,
    /// All chunks verified and the assembled artifact matched the fingerprint.
    Completed,
    /// Unrecoverable for this session (assembly mismatch, lost chunk data).
    Failed,
    /// Evicted after sitting idle past the TTL.
    Expired,
}

impl SessionStatus {
    /// Returns `true` while the session can still accept chunks.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Initialized | Self::Uploading)
    }

    /// Returns `true` once the session can never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }

    /// Wire/display form, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single chunk within a session.
///
/// Transitions are forward-only: pending → received → verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    /// Not yet seen.
    Pending,
    /// Bytes arrived but verification has not finished.
    Received,
    /// Checksum verified and durably stored.
    Verified,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Initialized).unwrap(),
            "\"initialized\""
        );
        assert_eq!(
            serde_json::to_string(&SessionStatus::Uploading).unwrap(),
            "\"uploading\""
        );
        assert_eq!(
            serde_json::to_string(&SessionStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(
            serde_json::to_string(&SessionStatus::Failed).unwrap(),
            "\"failed\""
        );
        assert_eq!(
            serde_json::to_string(&SessionStatus::Expired).unwrap(),
            "\"expired\""
        );
    }

    #[test]
    fn chunk_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ChunkStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&ChunkStatus::Verified).unwrap(),
            "\"verified\""
        );
    }

    #[test]
    fn active_and_terminal_partition() {
        for status in [
            SessionStatus::Initialized,
            SessionStatus::Uploading,
            SessionStatus::Completed,
            SessionStatus::Failed,
            SessionStatus::Expired,
        ] {
            assert_ne!(status.is_active(), status.is_terminal());
        }
    }

    #[test]
    fn status_roundtrip() {
        let status: SessionStatus = serde_json::from_str("\"uploading\"").unwrap();
        assert_eq!(status, SessionStatus::Uploading);
    }
}
