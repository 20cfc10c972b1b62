//! Lock Manager Module
//!
//! Owner-qualified mutual exclusion records in the `cache_locks` table.
//! A lock past its expiration is abandoned and any acquirer may take it
//! over; there is no renewal or liveness check of the previous owner.

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use crate::cache::entry::{current_timestamp, LockEntry};
use crate::cache::sqlite::{is_constraint_violation, Database};
use crate::error::Result;

// == Lock Manager ==
#[derive(Debug, Clone)]
pub struct LockManager {
    db: Database,
}

impl LockManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // == Acquire ==
    /// Takes the lock for `owner` for `ttl_seconds`.
    ///
    /// Succeeds when the lock is absent or expired. A live lock is never
    /// taken over, not even by its current owner.
    pub fn acquire(&self, key: &str, owner: &str, ttl_seconds: i64) -> Result<bool> {
        let lock = LockEntry::new(key, owner, ttl_seconds);

        let acquired = self.db.with_conn(|conn| {
            match conn.execute(
                "INSERT INTO cache_locks(key, owner, expiration) VALUES(?1, ?2, ?3)",
                params![lock.key, lock.owner, lock.expiration],
            ) {
                Ok(_) => Ok(true),
                Err(err) if is_constraint_violation(&err) => {
                    let stolen = conn.execute(
                        "UPDATE cache_locks SET owner = ?2, expiration = ?3
                         WHERE key = ?1 AND expiration < ?4",
                        params![lock.key, lock.owner, lock.expiration, current_timestamp()],
                    )?;
                    Ok(stolen > 0)
                }
                Err(err) => Err(err),
            }
        })?;

        debug!(key, owner, acquired, "acquire lock");
        Ok(acquired)
    }

    // == Release ==
    /// Deletes the lock if `owner` holds it.
    ///
    /// Releasing an absent or foreign lock is not an error; it reports `false`.
    pub fn release(&self, key: &str, owner: &str) -> Result<bool> {
        let removed = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM cache_locks WHERE key = ?1 AND owner = ?2",
                params![key, owner],
            )
        })?;

        debug!(key, owner, released = removed > 0, "release lock");
        Ok(removed > 0)
    }

    // == Inspect ==
    /// Current holder of the lock, if any row exists.
    pub fn owner(&self, key: &str) -> Result<Option<String>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT owner FROM cache_locks WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Full lock row, expired or not.
    pub fn entry(&self, key: &str) -> Result<Option<LockEntry>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT key, owner, expiration FROM cache_locks WHERE key = ?1",
                params![key],
                |row| {
                    Ok(LockEntry {
                        key: row.get(0)?,
                        owner: row.get(1)?,
                        expiration: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }
}
