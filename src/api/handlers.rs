//! API Handlers
//!
//! HTTP request handlers for each node endpoint. Keys arrive fully prefixed
//! from the sending node, so handlers pass them to the router as-is.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::error::{CacheError, Result};
use crate::models::{
    AddResponse, LockRequest, LockResponse, PingResponse, PutRequest, ReleaseLockRequest,
    ReleaseLockResponse, SuccessResponse,
};
use crate::router::CacheRouter;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Router the handlers drive
    pub router: Arc<CacheRouter>,
    /// Expected value of the token header
    pub api_token: Arc<str>,
}

impl AppState {
    /// Creates a new AppState around the given router.
    pub fn new(router: Arc<CacheRouter>, api_token: impl Into<Arc<str>>) -> Self {
        Self {
            router,
            api_token: api_token.into(),
        }
    }
}

/// Handler for GET /cache/:key
///
/// Responds with the stored value, or `null` when absent or expired.
pub async fn get_handler(State(state): State<AppState>, Path(key): Path<String>) -> Result<Json<Value>> {
    let value = state.router.get(&key).await?;
    Ok(Json(value.unwrap_or(Value::Null)))
}

/// Handler for POST /cache/:key
pub async fn put_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<PutRequest>,
) -> Result<Json<SuccessResponse>> {
    let success = state.router.put(&key, req.value, req.ttl).await?;
    Ok(Json(SuccessResponse { success }))
}

/// Handler for POST /add/:key
pub async fn add_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<PutRequest>,
) -> Result<Json<AddResponse>> {
    let added = state.router.add(&key, req.value, req.ttl).await?;
    Ok(Json(AddResponse { added }))
}

/// Handler for DELETE /cache/:key
pub async fn forget_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<SuccessResponse>> {
    let success = state.router.forget(&key).await?;
    Ok(Json(SuccessResponse { success }))
}

/// Handler for DELETE /cache
pub async fn flush_handler(State(state): State<AppState>) -> Result<Json<SuccessResponse>> {
    let success = state.router.flush().await?;
    Ok(Json(SuccessResponse { success }))
}

/// Handler for POST /lock/:key
pub async fn lock_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<LockRequest>,
) -> Result<Json<LockResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let acquired = state.router.acquire_lock(&key, &req.owner, req.ttl).await?;
    Ok(Json(LockResponse { acquired }))
}

/// Handler for DELETE /lock/:key
pub async fn release_lock_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<ReleaseLockRequest>,
) -> Result<Json<ReleaseLockResponse>> {
    let released = state.router.release_lock(&key, &req.owner).await?;
    Ok(Json(ReleaseLockResponse { released }))
}

/// Handler for GET /ping
///
/// A secondary relays the primary's answer; if the primary is unreachable
/// it answers for itself.
pub async fn ping_handler(State(state): State<AppState>) -> Json<PingResponse> {
    let pong = match state.router.ping().await {
        Some(pong) => pong,
        None => PingResponse::pong(state.router.role().as_str(), crate::config::local_hostname()),
    };
    Json(pong)
}
