//! Upload API handlers.

use std::path::Path;

use axum::Json;
use axum::extract::{Multipart, Path as UrlPath, State};
use uuid::Uuid;

use cargohold_protocol::{
    ArchiveEntry, ChunkAck, ContentsResponse, InitUploadRequest, InitUploadResponse,
    StatusResponse, UploadProgress,
};

use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// `POST /upload/init`: create or resume an upload session.
pub async fn init_upload(
    State(state): State<AppState>,
    Json(req): Json<InitUploadRequest>,
) -> ApiResult<Json<InitUploadResponse>> {
    let (upload_id, uploaded_chunks) = state.registry.init_session(&req).await?;
    Ok(Json(InitUploadResponse {
        upload_id: upload_id.to_string(),
        uploaded_chunks,
    }))
}

/// `POST /upload/chunk`: accept one chunk as a multipart form.
///
/// Fields: `uploadId`, `chunkIndex`, `chunkHash`, and the file part `chunk`.
pub async fn upload_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ChunkAck>> {
    let mut upload_id: Option<String> = None;
    let mut chunk_index: Option<u32> = None;
    let mut chunk_hash: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("uploadId") => upload_id = Some(read_text(field).await?),
            Some("chunkIndex") => {
                let text = read_text(field).await?;
                chunk_index = Some(text.parse::<u32>().map_err(|_| {
                    ApiError::BadRequest(format!(
                        "chunkIndex must be a non-negative integer, got {text:?}"
                    ))
                })?);
            }
            Some("chunkHash") => chunk_hash = Some(read_text(field).await?),
            Some("chunk") => {
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("failed to read chunk: {e}")))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let upload_id = upload_id.ok_or_else(|| ApiError::BadRequest("missing uploadId".into()))?;
    let chunk_index =
        chunk_index.ok_or_else(|| ApiError::BadRequest("missing chunkIndex".into()))?;
    let chunk_hash = chunk_hash.ok_or_else(|| ApiError::BadRequest("missing chunkHash".into()))?;
    let bytes = bytes.ok_or_else(|| ApiError::BadRequest("missing chunk file part".into()))?;

    let id = parse_upload_id(&upload_id)?;
    state
        .registry
        .accept_chunk(id, chunk_index, &chunk_hash, bytes)
        .await?;

    Ok(Json(ChunkAck::ok()))
}

/// `GET /upload/{id}/status`: session status and progress counters.
pub async fn get_status(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<Json<StatusResponse>> {
    let id = parse_upload_id(&id)?;
    let snapshot = state.registry.status(id).await?;
    Ok(Json(StatusResponse {
        status: snapshot.status,
        progress: UploadProgress {
            completed: snapshot.verified,
            total: snapshot.total,
        },
    }))
}

/// `GET /upload/{id}/contents`: list the assembled archive's entries.
/// Valid only once the session is completed.
pub async fn get_contents(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<Json<ContentsResponse>> {
    let id = parse_upload_id(&id)?;
    let artifact = state.registry.artifact_path(id).await?;

    let entries = tokio::task::spawn_blocking(move || read_archive_entries(&artifact))
        .await
        .map_err(|e| ApiError::Internal(format!("archive listing task failed: {e}")))??;

    Ok(Json(ContentsResponse { entries }))
}

/// `GET /health`: liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

fn parse_upload_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("invalid upload id: {e}")))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read form field: {e}")))
}

fn read_archive_entries(path: &Path) -> Result<Vec<ArchiveEntry>, ApiError> {
    let file = std::fs::File::open(path)
        .map_err(|e| ApiError::Internal(format!("failed to open artifact: {e}")))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| ApiError::BadRequest(format!("artifact is not a readable zip archive: {e}")))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| ApiError::Internal(format!("failed to read archive entry {i}: {e}")))?;
        entries.push(ArchiveEntry {
            name: entry.name().to_string(),
            size: entry.size(),
            compressed_size: entry.compressed_size(),
            is_dir: entry.is_dir(),
        });
    }
    Ok(entries)
}
