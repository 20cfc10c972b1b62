//! API Routes
//!
//! Configures the Axum router with all node endpoints.

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::auth::require_token;
use super::handlers::{
    add_handler, flush_handler, forget_handler, get_handler, lock_handler, ping_handler,
    put_handler, release_lock_handler, AppState,
};

/// Creates the router with all endpoints configured at the root.
///
/// # Endpoints
/// - `GET /cache/:key` - Retrieve a value (or `null`)
/// - `POST /cache/:key` - Store a value
/// - `DELETE /cache/:key` - Forget a key
/// - `DELETE /cache` - Flush all keys
/// - `POST /add/:key` - Store a value if absent or expired
/// - `POST /lock/:key` - Acquire a lock
/// - `DELETE /lock/:key` - Release a lock
/// - `GET /ping` - Role, hostname and time
///
/// # Middleware
/// - Token check on every route (401 on mismatch)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/cache", delete(flush_handler))
        .route(
            "/cache/:key",
            get(get_handler).post(put_handler).delete(forget_handler),
        )
        .route("/add/:key", post(add_handler))
        .route("/lock/:key", post(lock_handler).delete(release_lock_handler))
        .route("/ping", get(ping_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Mounts [`create_router`] under `api_path` (e.g. `/api/hypercache`).
pub fn create_app(state: AppState, api_path: &str) -> Router {
    let api_path = api_path.trim_end_matches('/');
    if api_path.is_empty() {
        create_router(state)
    } else if api_path.starts_with('/') {
        Router::new().nest(api_path, create_router(state))
    } else {
        Router::new().nest(&format!("/{}", api_path), create_router(state))
    }
}
