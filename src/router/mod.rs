//! Router Module
//!
//! Role-aware entry point for cache and lock operations.

mod cache_router;
mod lock;

pub use cache_router::{Backend, CacheRouter};
pub use lock::{CacheLock, FOREVER_LOCK_SECONDS};
