//! Hypercache - a replicated key-value cache
//!
//! One primary node owns a SQLite-backed store. Secondary nodes forward
//! every operation to it over HTTP, authenticated by a shared token, and keep
//! a per-process L1 cache in front.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod replication;
pub mod router;
pub mod tasks;

pub use api::{create_app, create_router, AppState};
pub use config::{Config, Role};
pub use error::{CacheError, Result};
pub use replication::ReplicationClient;
pub use router::{CacheLock, CacheRouter};
pub use tasks::spawn_cleanup_task;
