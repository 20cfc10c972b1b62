//! Cache Entry Module
//!
//! Row types for the `cache` and `cache_locks` tables plus the expiration
//! arithmetic shared by every read and write path.

use chrono::Utc;

// == Cache Entry ==
/// A row of the `cache` table.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Fully prefixed key
    pub key: String,
    /// Codec-encoded value payload
    pub value: Vec<u8>,
    /// Absolute expiration (Unix seconds), None = never expires
    pub expiration: Option<i64>,
}

impl CacheEntry {
    /// Creates a new entry expiring `ttl_seconds` from now.
    ///
    /// A missing or non-positive TTL means the entry never expires.
    pub fn new(key: impl Into<String>, value: Vec<u8>, ttl_seconds: Option<i64>) -> Self {
        Self {
            key: key.into(),
            value,
            expiration: expiration_from_ttl(ttl_seconds),
        }
    }

    // == Is Expired ==
    /// Checks whether the entry has expired at `now`.
    ///
    /// An entry is expired once `expiration < now`; the expiration second
    /// itself is still live.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expiration.is_some_and(|expiration| expiration < now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp())
    }
}

// == Lock Entry ==
/// A row of the `cache_locks` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    pub key: String,
    /// Opaque holder identity, required to release
    pub owner: String,
    /// Absolute expiration (Unix seconds); past it the lock is abandoned
    pub expiration: i64,
}

impl LockEntry {
    pub fn new(key: impl Into<String>, owner: impl Into<String>, ttl_seconds: i64) -> Self {
        Self {
            key: key.into(),
            owner: owner.into(),
            expiration: current_timestamp().saturating_add(ttl_seconds),
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expiration < now
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in seconds.
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Converts a relative TTL into an absolute expiration.
///
/// Saturates at `i64::MAX`, which is never reached.
pub fn expiration_from_ttl(ttl_seconds: Option<i64>) -> Option<i64> {
    ttl_seconds
        .filter(|ttl| *ttl > 0)
        .map(|ttl| current_timestamp().saturating_add(ttl))
}
