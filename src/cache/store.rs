//! Cache Store Module
//!
//! Durable key/value storage on the primary node, backed by the `cache` table.
//! Insert-if-absent relies on the table's primary key rather than a
//! read-then-write in application code.

use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::codec;
use crate::cache::entry::{current_timestamp, expiration_from_ttl, CacheEntry};
use crate::cache::sqlite::{is_constraint_violation, Database};
use crate::cache::GcPolicy;
use crate::error::Result;

// == Persistent Store ==
/// SQLite-backed cache table with lazy expiry and probabilistic sweeping.
#[derive(Debug, Clone)]
pub struct PersistentStore {
    db: Database,
    gc: GcPolicy,
}

impl PersistentStore {
    // == Constructor ==
    pub fn new(db: Database, gc: GcPolicy) -> Self {
        Self { db, gc }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // == Entry ==
    /// Raw row lookup, expired or not.
    pub fn entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT key, value, expiration FROM cache WHERE key = ?1",
                params![key],
                |row| {
                    Ok(CacheEntry {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        expiration: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    // == Get ==
    /// Retrieves a live value by key.
    ///
    /// Missing and expired rows both read as `None`; expired rows are left
    /// in place for the sweep.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        match self.entry(key)? {
            Some(entry) if !entry.is_expired() => Ok(Some(codec::decode(&entry.value)?)),
            _ => Ok(None),
        }
    }

    // == Put ==
    /// Unconditionally stores a value.
    ///
    /// A missing or non-positive TTL stores the value without expiration.
    /// Some writes first sweep expired rows, per the [`GcPolicy`].
    pub fn put(&self, key: &str, value: &Value, ttl: Option<i64>) -> Result<()> {
        if self.gc.should_sweep() {
            self.purge_expired()?;
        }

        let entry = CacheEntry::new(key, codec::encode(value)?, ttl);

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO cache(key, value, expiration) VALUES(?1, ?2, ?3)",
                params![entry.key, entry.value, entry.expiration],
            )
        })?;

        Ok(())
    }

    // == Add ==
    /// Stores a value only if the key is absent or expired.
    ///
    /// The insert is attempted first; on a primary-key violation the row is
    /// overwritten by a single conditional update that only matches an
    /// expired row, so two racing writers cannot both win.
    pub fn add(&self, key: &str, value: &Value, ttl: Option<i64>) -> Result<bool> {
        let bytes = codec::encode(value)?;
        let expiration = expiration_from_ttl(ttl);

        let inserted = self.db.with_conn(|conn| {
            match conn.execute(
                "INSERT INTO cache(key, value, expiration) VALUES(?1, ?2, ?3)",
                params![key, bytes, expiration],
            ) {
                Ok(_) => Ok(true),
                Err(err) if is_constraint_violation(&err) => {
                    let replaced = conn.execute(
                        "UPDATE cache SET value = ?2, expiration = ?3
                         WHERE key = ?1 AND expiration IS NOT NULL AND expiration < ?4",
                        params![key, bytes, expiration, current_timestamp()],
                    )?;
                    Ok(replaced > 0)
                }
                Err(err) => Err(err),
            }
        })?;

        debug!(key, inserted, "add");
        Ok(inserted)
    }

    // == Forget ==
    /// Removes an entry by key. Succeeds whether or not the key existed.
    pub fn forget(&self, key: &str) -> Result<()> {
        self.db
            .with_conn(|conn| conn.execute("DELETE FROM cache WHERE key = ?1", params![key]))?;
        Ok(())
    }

    // == Flush ==
    /// Removes every cache entry. Locks are untouched.
    pub fn flush(&self) -> Result<()> {
        let removed = self
            .db
            .with_conn(|conn| conn.execute("DELETE FROM cache", []))?;
        info!("Flushed {} cache entries", removed);
        Ok(())
    }

    // == Cleanup Expired ==
    /// Deletes all expired rows. Returns the number removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let removed = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM cache WHERE expiration IS NOT NULL AND expiration < ?1",
                params![current_timestamp()],
            )
        })?;

        if removed > 0 {
            info!("GC sweep removed {} expired entries", removed);
        }
        Ok(removed)
    }

    // == Length ==
    /// Number of rows, expired-but-unswept included.
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0)))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Barrier};
    use std::thread::{self, sleep};
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn test_store(gc: GcPolicy) -> (TempDir, PersistentStore) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        (dir, PersistentStore::new(db, gc))
    }

    /// Writes a row whose expiration already passed.
    fn insert_expired(store: &PersistentStore, key: &str, value: &Value) {
        let bytes = codec::encode(value).unwrap();
        store
            .database()
            .with_conn(|conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO cache(key, value, expiration) VALUES(?1, ?2, ?3)",
                    params![key, bytes, current_timestamp() - 10],
                )
            })
            .unwrap();
    }

    #[test]
    fn test_store_new() {
        let (_dir, store) = test_store(GcPolicy::disabled());
        assert_eq!(store.len().unwrap(), 0);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_store_put_and_get() {
        let (_dir, store) = test_store(GcPolicy::disabled());

        store.put("key1", &json!("value1"), Some(60)).unwrap();

        assert_eq!(store.get("key1").unwrap(), Some(json!("value1")));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let (_dir, store) = test_store(GcPolicy::disabled());
        assert_eq!(store.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_store_overwrite() {
        let (_dir, store) = test_store(GcPolicy::disabled());

        store.put("key1", &json!(1), None).unwrap();
        store.put("key1", &json!({"nested": [1, 2]}), None).unwrap();

        assert_eq!(store.get("key1").unwrap(), Some(json!({"nested": [1, 2]})));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_store_put_without_ttl_has_no_expiration() {
        let (_dir, store) = test_store(GcPolicy::disabled());
        store.put("forever", &json!(true), Some(0)).unwrap();

        let expiration: Option<i64> = store
            .database()
            .with_conn(|conn| {
                conn.query_row("SELECT expiration FROM cache WHERE key = 'forever'", [], |row| {
                    row.get(0)
                })
            })
            .unwrap();
        assert!(expiration.is_none());
    }

    #[test]
    fn test_expired_row_reads_absent_but_remains() {
        let (_dir, store) = test_store(GcPolicy::disabled());
        insert_expired(&store, "stale", &json!("old"));

        assert_eq!(store.get("stale").unwrap(), None);
        assert!(store.entry("stale").unwrap().unwrap().is_expired());
        // Pure read: the row is still physically present
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_add_rejects_live_key() {
        let (_dir, store) = test_store(GcPolicy::disabled());

        assert!(store.add("key", &json!("v1"), Some(60)).unwrap());
        assert!(!store.add("key", &json!("v2"), Some(60)).unwrap());
        assert_eq!(store.get("key").unwrap(), Some(json!("v1")));
    }

    #[test]
    fn test_add_rejects_key_without_expiration() {
        let (_dir, store) = test_store(GcPolicy::disabled());

        store.put("key", &json!("v1"), None).unwrap();
        assert!(!store.add("key", &json!("v2"), None).unwrap());
    }

    #[test]
    fn test_add_replaces_expired_key() {
        let (_dir, store) = test_store(GcPolicy::disabled());
        insert_expired(&store, "key", &json!("old"));

        assert!(store.add("key", &json!("new"), Some(60)).unwrap());
        assert_eq!(store.get("key").unwrap(), Some(json!("new")));
    }

    #[test]
    fn test_add_after_ttl_elapses() {
        let (_dir, store) = test_store(GcPolicy::disabled());

        assert!(store.add("key", &json!("v"), Some(1)).unwrap());
        sleep(Duration::from_millis(2100));

        assert!(store.add("key", &json!("v2"), Some(60)).unwrap());
        assert_eq!(store.get("key").unwrap(), Some(json!("v2")));
    }

    #[test]
    fn test_store_forget() {
        let (_dir, store) = test_store(GcPolicy::disabled());

        store.put("key1", &json!("value1"), None).unwrap();
        store.forget("key1").unwrap();

        assert!(store.is_empty().unwrap());
        assert_eq!(store.get("key1").unwrap(), None);
    }

    #[test]
    fn test_store_forget_nonexistent() {
        let (_dir, store) = test_store(GcPolicy::disabled());
        assert!(store.forget("nonexistent").is_ok());
    }

    #[test]
    fn test_store_flush() {
        let (_dir, store) = test_store(GcPolicy::disabled());
        store.put("a", &json!(1), None).unwrap();
        store.put("b", &json!(2), Some(60)).unwrap();

        store.flush().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_purge_expired() {
        let (_dir, store) = test_store(GcPolicy::disabled());
        insert_expired(&store, "stale", &json!(1));
        store.put("live", &json!(2), Some(60)).unwrap();
        store.put("forever", &json!(3), None).unwrap();

        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.get("live").unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_put_sweeps_when_policy_fires() {
        let (_dir, store) = test_store(GcPolicy::new(1.0));
        insert_expired(&store, "stale", &json!(1));

        store.put("fresh", &json!(2), None).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_put_keeps_expired_rows_when_policy_idle() {
        let (_dir, store) = test_store(GcPolicy::disabled());
        insert_expired(&store, "stale", &json!(1));

        store.put("fresh", &json!(2), None).unwrap();
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_stores_on_same_file_share_state() {
        let dir = tempdir().unwrap();
        let first = PersistentStore::new(Database::open(dir.path()).unwrap(), GcPolicy::disabled());
        let second = PersistentStore::new(Database::open(dir.path()).unwrap(), GcPolicy::disabled());

        assert!(first.add("shared", &json!("a"), Some(60)).unwrap());
        assert!(!second.add("shared", &json!("b"), Some(60)).unwrap());
        assert_eq!(second.get("shared").unwrap(), Some(json!("a")));
    }

    #[test]
    fn test_put_with_max_ttl_stays_readable() {
        let (_dir, store) = test_store(GcPolicy::new(1.0));

        store.put("k", &json!(1), Some(i64::MAX)).unwrap();
        assert_eq!(store.entry("k").unwrap().unwrap().expiration, Some(i64::MAX));
        assert_eq!(store.get("k").unwrap(), Some(json!(1)));

        assert!(store.add("a", &json!("first"), Some(i64::MAX)).unwrap());
        assert!(!store.add("a", &json!("second"), Some(i64::MAX)).unwrap());
        assert_eq!(store.get("a").unwrap(), Some(json!("first")));
    }

    #[test]
    fn test_concurrent_add_has_single_winner() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 20;

        let dir = tempdir().unwrap();
        // Create the schema before the race so every thread only opens it.
        Database::open(dir.path()).unwrap();

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|id| {
                let path = dir.path().to_path_buf();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let store = PersistentStore::new(Database::open(&path).unwrap(), GcPolicy::disabled());
                    (0..ROUNDS)
                        .map(|round| {
                            barrier.wait();
                            store.add(&format!("race-{}", round), &json!(id), Some(60))
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<Vec<Result<bool>>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for round in 0..ROUNDS {
            let mut wins = 0;
            for per_thread in &results {
                match &per_thread[round] {
                    Ok(true) => wins += 1,
                    Ok(false) => {}
                    Err(err) => panic!("add failed in round {}: {}", round, err),
                }
            }
            assert_eq!(wins, 1, "round {} had {} winners", round, wins);
        }
    }
}
