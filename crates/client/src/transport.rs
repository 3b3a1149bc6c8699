//! Server transport abstraction.
//!
//! The scheduler talks to the server through the [`Transport`] trait so
//! tests can substitute mocks; [`HttpTransport`] is the real implementation
//! over the HTTP API.

use std::future::Future;
use std::pin::Pin;

use cargohold_protocol::{ErrorResponse, InitUploadRequest, InitUploadResponse, StatusResponse};

/// Transport failures, split by how the scheduler should react.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Network failure or 5xx; retry with backoff.
    #[error("transient transport error: {0}")]
    Transient(String),

    /// The server recomputed a different checksum: the bytes were corrupted
    /// in transit, so re-sending the same chunk may succeed.
    #[error("chunk rejected: {0}")]
    ChecksumRejected(String),

    /// Unknown or expired session. Fatal for the attempt; a fresh
    /// handshake is required.
    #[error("session not found: {0}")]
    NotFound(String),

    /// Any other 4xx: malformed request, not worth retrying.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Whether the scheduler's per-chunk retry budget applies.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::ChecksumRejected(_))
    }
}

/// Boxed future returned by transport methods.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Abstract connection to the upload server.
///
/// Arguments are owned so implementations can move them straight into the
/// returned future.
pub trait Transport: Send + Sync {
    /// `POST /upload/init`: create or resume a session.
    fn init(&self, req: InitUploadRequest) -> TransportFuture<'_, InitUploadResponse>;

    /// `POST /upload/chunk`: submit one chunk.
    fn upload_chunk(
        &self,
        upload_id: String,
        index: u32,
        checksum: String,
        bytes: Vec<u8>,
    ) -> TransportFuture<'_, ()>;

    /// `GET /upload/{id}/status`: poll session progress.
    fn status(&self, upload_id: String) -> TransportFuture<'_, StatusResponse>;
}

/// HTTP implementation of [`Transport`] over the cargohold API.
pub struct HttpTransport {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport against `base_url` (e.g. `http://localhost:3001`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Maps a non-2xx response into the transport error taxonomy, pulling
    /// the server's `{error}` body through when present.
    async fn error_for(resp: reqwest::Response) -> TransportError {
        let status = resp.status();
        let message = match resp.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => format!("HTTP {status}"),
        };

        if status.is_server_error() {
            TransportError::Transient(message)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            TransportError::NotFound(message)
        } else if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            TransportError::ChecksumRejected(message)
        } else {
            TransportError::Rejected(message)
        }
    }
}

impl Transport for HttpTransport {
    fn init(&self, req: InitUploadRequest) -> TransportFuture<'_, InitUploadResponse> {
        let url = format!("{}/upload/init", self.base_url);
        Box::pin(async move {
            let resp = self
                .http
                .post(url)
                .json(&req)
                .send()
                .await
                .map_err(|e| TransportError::Transient(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(Self::error_for(resp).await);
            }
            resp.json::<InitUploadResponse>()
                .await
                .map_err(|e| TransportError::Transient(e.to_string()))
        })
    }

    fn upload_chunk(
        &self,
        upload_id: String,
        index: u32,
        checksum: String,
        bytes: Vec<u8>,
    ) -> TransportFuture<'_, ()> {
        let url = format!("{}/upload/chunk", self.base_url);
        Box::pin(async move {
            let part = reqwest::multipart::Part::bytes(bytes)
                .file_name(format!("chunk_{index}"))
                .mime_str("application/octet-stream")
                .map_err(|e| TransportError::Transient(e.to_string()))?;
            let form = reqwest::multipart::Form::new()
                .text("uploadId", upload_id)
                .text("chunkIndex", index.to_string())
                .text("chunkHash", checksum)
                .part("chunk", part);

            let resp = self
                .http
                .post(url)
                .multipart(form)
                .send()
                .await
                .map_err(|e| TransportError::Transient(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(Self::error_for(resp).await);
            }
            Ok(())
        })
    }

    fn status(&self, upload_id: String) -> TransportFuture<'_, StatusResponse> {
        let url = format!("{}/upload/{upload_id}/status", self.base_url);
        Box::pin(async move {
            let resp = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| TransportError::Transient(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(Self::error_for(resp).await);
            }
            resp.json::<StatusResponse>()
                .await
                .map_err(|e| TransportError::Transient(e.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_trimmed() {
        let t = HttpTransport::new("http://localhost:3001///");
        assert_eq!(t.base_url, "http://localhost:3001");
    }

    #[test]
    fn retryability_split() {
        assert!(TransportError::Transient("x".into()).is_retryable());
        assert!(TransportError::ChecksumRejected("x".into()).is_retryable());
        assert!(!TransportError::NotFound("x".into()).is_retryable());
        assert!(!TransportError::Rejected("x".into()).is_retryable());
    }
}
