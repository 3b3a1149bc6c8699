//! API error type and HTTP status mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use cargohold_protocol::ErrorResponse;
use cargohold_registry::RegistryError;

/// API error. Every variant renders as `{"error": "..."}` with the status
/// code below.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Chunk content did not match its checksum; distinct from plain 400 so
    /// clients know a re-send of the same chunk may succeed.
    #[error("{0}")]
    ChecksumMismatch(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ChecksumMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Validation(msg) => Self::BadRequest(msg),
            RegistryError::NotFound(_) => Self::NotFound(err.to_string()),
            RegistryError::Conflict(msg) => Self::Conflict(msg),
            RegistryError::ChecksumMismatch { .. } => Self::ChecksumMismatch(err.to_string()),
            RegistryError::Assembly(_)
            | RegistryError::Io(_)
            | RegistryError::Persist(_)
            | RegistryError::Internal(_) => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
