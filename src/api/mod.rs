//! API Module
//!
//! HTTP boundary of a node: the endpoints a secondary forwards to, guarded
//! by the shared-secret token.
//!
//! # Endpoints
//! - `GET|POST|DELETE /cache/:key` - Get, put, forget
//! - `DELETE /cache` - Flush
//! - `POST /add/:key` - Insert if absent
//! - `POST|DELETE /lock/:key` - Acquire, release
//! - `GET /ping` - Node identity

pub mod auth;
pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::{create_app, create_router};
