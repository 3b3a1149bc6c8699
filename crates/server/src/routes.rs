//! Route configuration.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Headroom over the chunk size for multipart framing and the small text
/// fields that ride along with the chunk bytes.
const CHUNK_BODY_SLACK: usize = 64 * 1024;

/// Builds the application router.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.registry.chunk_size() as usize + CHUNK_BODY_SLACK;

    Router::new()
        .route("/upload/init", post(handlers::init_upload))
        .route("/upload/chunk", post(handlers::upload_chunk))
        .route("/upload/{id}/status", get(handlers::get_status))
        .route("/upload/{id}/contents", get(handlers::get_contents))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
