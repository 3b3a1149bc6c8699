//! HTTP surface for the cargohold upload service.
//!
//! A thin axum layer over [`cargohold_registry::SessionRegistry`]: routing,
//! request decoding, and error-to-status mapping live here; all upload
//! semantics live in the registry and transfer crates.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
