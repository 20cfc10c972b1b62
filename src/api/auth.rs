//! Token Middleware
//!
//! Rejects any request whose token header does not match the node's shared
//! secret before it reaches a handler.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::handlers::AppState;
use crate::error::CacheError;
use crate::replication::{SERVER_ID_HEADER, TOKEN_HEADER};

/// Checks `X-Hypercache-Token` against the configured token.
///
/// An empty configured token rejects everything.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, CacheError> {
    let provided = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    let authorized = !state.api_token.is_empty() && provided == Some(state.api_token.as_ref());
    if !authorized {
        let sender = request
            .headers()
            .get(SERVER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("unknown");
        warn!(
            "Rejected {} {} from server '{}': bad or missing token",
            request.method(),
            request.uri().path(),
            sender
        );
        return Err(CacheError::Unauthorized);
    }

    Ok(next.run(request).await)
}
