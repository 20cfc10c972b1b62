//! Cache Module
//!
//! Primary-side storage: the SQLite cache and lock tables, the expiration
//! sweep policy, the value codec, and the process-local L1 cache.

pub mod codec;
mod entry;
mod gc;
mod l1;
mod lock;
mod sqlite;
mod store;


// Re-export public types
pub use entry::{current_timestamp, expiration_from_ttl, CacheEntry, LockEntry};
pub use gc::{GcPolicy, DEFAULT_GC_PROBABILITY};
pub use l1::L1Cache;
pub use lock::LockManager;
pub use sqlite::{Database, DATABASE_FILE};
pub use store::PersistentStore;
