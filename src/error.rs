//! Error types for the cache node
//!
//! Provides unified error handling using thiserror. Misses, conflicts and
//! replication transport failures are not errors; they surface as typed
//! `Option`/`bool` results.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache node.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Storage engine fault on the primary
    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// Storage directory could not be prepared
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Value could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Missing or mismatched shared-secret token
    #[error("Unauthorized")]
    Unauthorized,

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid node configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::Unauthorized => StatusCode::UNAUTHORIZED,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Persistence(_)
            | CacheError::Storage(_)
            | CacheError::Codec(_)
            | CacheError::Config(_)
            | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache node.
pub type Result<T> = std::result::Result<T, CacheError>;
