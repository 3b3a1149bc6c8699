use serde::{Deserialize, Serialize};

use crate::types::SessionStatus;

/// Body of `POST /upload/init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadRequest {
    /// Original filename of the archive being uploaded.
    pub filename: String,
    /// Total file size in bytes.
    pub total_size: u64,
    /// Number of chunks the client intends to send.
    ///
    /// The server recomputes this from its own chunk size and rejects a
    /// disagreement, so a stale client cannot create an inconsistent session.
    pub total_chunks: u32,
    /// Hex SHA-256 of the whole file.
    pub file_hash: String,
}

/// Response to `POST /upload/init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    pub upload_id: String,
    /// Indices already verified by the server (the resume set).
    pub uploaded_chunks: Vec<u32>,
}

/// Response to a successfully accepted chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkAck {
    pub status: String,
}

impl ChunkAck {
    pub fn ok() -> Self {
        Self {
            status: "ok".into(),
        }
    }
}

/// Progress counters inside a status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub completed: u32,
    pub total: u32,
}

/// Response to `GET /upload/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: SessionStatus,
    pub progress: UploadProgress,
}

/// One entry of the assembled archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
    pub is_dir: bool,
}

/// Response to `GET /upload/{id}/contents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentsResponse {
    pub entries: Vec<ArchiveEntry>,
}

/// Error envelope for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_request_uses_camel_case() {
        let req = InitUploadRequest {
            filename: "build.zip".into(),
            total_size: 12 * 1024 * 1024,
            total_chunks: 3,
            file_hash: "ab".repeat(32),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["filename"], "build.zip");
        assert_eq!(json["totalSize"], 12 * 1024 * 1024);
        assert_eq!(json["totalChunks"], 3);
        assert!(json["fileHash"].is_string());
    }

    #[test]
    fn init_response_roundtrip() {
        let json = r#"{"uploadId":"abc","uploadedChunks":[0,2]}"#;
        let resp: InitUploadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.upload_id, "abc");
        assert_eq!(resp.uploaded_chunks, vec![0, 2]);
    }

    #[test]
    fn chunk_ack_is_ok() {
        let json = serde_json::to_value(ChunkAck::ok()).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[test]
    fn status_response_shape() {
        let resp = StatusResponse {
            status: SessionStatus::Uploading,
            progress: UploadProgress {
                completed: 2,
                total: 3,
            },
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "uploading");
        assert_eq!(json["progress"]["completed"], 2);
        assert_eq!(json["progress"]["total"], 3);
    }

    #[test]
    fn archive_entry_uses_camel_case() {
        let entry = ArchiveEntry {
            name: "assets/logo.png".into(),
            size: 1024,
            compressed_size: 512,
            is_dir: false,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["compressedSize"], 512);
        assert_eq!(json["isDir"], false);
    }
}
