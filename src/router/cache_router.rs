//! Role-Based Router
//!
//! The single entry point for cache operations. Keys are prefixed, reads go
//! through the L1 cache, and every operation is then served by the local
//! store (primary) or forwarded to the primary over HTTP (secondary).
//!
//! The router takes no locks of its own. Atomicity of `add` and lock
//! acquisition comes from the primary's SQLite uniqueness constraint.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::lock::CacheLock;
use crate::cache::{codec, Database, GcPolicy, L1Cache, LockManager, PersistentStore};
use crate::config::{local_hostname, Config, Role};
use crate::error::{CacheError, Result};
use crate::models::{
    AddResponse, LockRequest, LockResponse, PingResponse, PutRequest, ReleaseLockRequest,
    ReleaseLockResponse, SuccessResponse,
};
use crate::replication::{encode_key, Method, ReplicationClient};

// == Backend ==
/// What serves operations once the L1 cache has been consulted.
#[derive(Debug)]
pub enum Backend {
    Primary {
        store: PersistentStore,
        locks: LockManager,
    },
    Secondary {
        client: ReplicationClient,
    },
}

// == Cache Router ==
#[derive(Debug)]
pub struct CacheRouter {
    backend: Backend,
    prefix: String,
    async_requests: bool,
    l1: Option<L1Cache>,
}

impl CacheRouter {
    // == Constructors ==
    /// Primary router over the given database.
    pub fn primary(db: Database, gc: GcPolicy) -> Self {
        Self::with_backend(Backend::Primary {
            store: PersistentStore::new(db.clone(), gc),
            locks: LockManager::new(db),
        })
    }

    /// Secondary router forwarding through `client`.
    ///
    /// Writes are synchronous until [`CacheRouter::with_async`] says otherwise.
    pub fn secondary(client: ReplicationClient) -> Self {
        Self::with_backend(Backend::Secondary { client })
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            prefix: String::new(),
            async_requests: false,
            l1: Some(L1Cache::new()),
        }
    }

    /// Builds the router described by `config`.
    ///
    /// A primary opens (and if needed creates) its SQLite database; a
    /// secondary only builds its HTTP client.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let router = match config.role {
            Role::Primary => Self::primary(
                Database::open(&config.sqlite_path)?,
                GcPolicy::new(config.gc_probability),
            ),
            Role::Secondary => Self::secondary(ReplicationClient::new(
                &config.primary_url,
                &config.api_token,
                config.timeout(),
            )?),
        };

        info!(
            "Cache router ready: role={}, async={}, prefix='{}'",
            config.role, config.async_requests, config.prefix
        );

        Ok(router
            .with_prefix(&config.prefix)
            .with_async(config.async_requests))
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Forward writes fire-and-forget. Reads, `add` and lock calls stay synchronous.
    pub fn with_async(mut self, async_requests: bool) -> Self {
        self.async_requests = async_requests;
        self
    }

    /// Enables or disables the process-local L1 cache.
    pub fn with_l1(mut self, enabled: bool) -> Self {
        self.l1 = enabled.then(L1Cache::new);
        self
    }

    // == Accessors ==
    pub fn role(&self) -> Role {
        match self.backend {
            Backend::Primary { .. } => Role::Primary,
            Backend::Secondary { .. } => Role::Secondary,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
    }

    pub fn is_async(&self) -> bool {
        self.async_requests
    }

    /// The local store, on a primary.
    pub fn store(&self) -> Option<&PersistentStore> {
        match &self.backend {
            Backend::Primary { store, .. } => Some(store),
            Backend::Secondary { .. } => None,
        }
    }

    pub fn l1(&self) -> Option<&L1Cache> {
        self.l1.as_ref()
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn remember(&self, key: &str, value: &Value) {
        if let Some(l1) = &self.l1 {
            l1.insert(key, value.clone());
        }
    }

    fn evict(&self, key: &str) {
        if let Some(l1) = &self.l1 {
            l1.remove(key);
        }
    }

    /// Forwards a write in the configured mode.
    ///
    /// Async writes report success as soon as they are dispatched; sync
    /// writes report the primary's `success` field.
    async fn forward_write(
        &self,
        client: &ReplicationClient,
        method: Method,
        endpoint: &str,
        payload: Option<Value>,
    ) -> bool {
        if self.async_requests {
            client.dispatch(method, endpoint, payload).await;
            return true;
        }

        parse::<SuccessResponse>(client.request(method, endpoint, payload).await)
            .is_some_and(|response| response.success)
    }

    // == Get ==
    /// Retrieves a value, checking L1 first.
    ///
    /// Secondaries always fetch synchronously. A found value is kept in L1;
    /// JSON `null` counts as absent.
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let key = self.prefixed(key);

        if let Some(value) = self.l1.as_ref().and_then(|l1| l1.get(&key)) {
            return Ok(Some(value));
        }

        let value = match &self.backend {
            Backend::Primary { store, .. } => {
                let (store, stored_key) = (store.clone(), key.clone());
                blocking(move || store.get(&stored_key)).await?
            }
            Backend::Secondary { client } => {
                client
                    .request(Method::GET, &format!("cache/{}", encode_key(&key)), None)
                    .await
            }
        }
        .filter(|value| !value.is_null());

        if let Some(value) = &value {
            self.remember(&key, value);
        }
        Ok(value)
    }

    /// Retrieves several values, keyed by the unprefixed names given.
    pub async fn many(&self, keys: &[&str]) -> Result<HashMap<String, Option<Value>>> {
        let mut values = HashMap::with_capacity(keys.len());
        for key in keys {
            values.insert((*key).to_string(), self.get(key).await?);
        }
        Ok(values)
    }

    // == Put ==
    /// Stores a value unconditionally.
    ///
    /// L1 is updated first. A missing or non-positive TTL never expires.
    pub async fn put(&self, key: &str, value: Value, ttl: Option<i64>) -> Result<bool> {
        let key = self.prefixed(key);
        self.remember(&key, &value);

        match &self.backend {
            Backend::Primary { store, .. } => {
                let (store, stored_key) = (store.clone(), key.clone());
                if let Err(err) = blocking(move || store.put(&stored_key, &value, ttl)).await {
                    self.evict(&key);
                    return Err(err);
                }
                Ok(true)
            }
            Backend::Secondary { client } => {
                let endpoint = format!("cache/{}", encode_key(&key));
                let payload = serde_json::to_value(PutRequest { value, ttl })?;
                let stored = self
                    .forward_write(client, Method::POST, &endpoint, Some(payload))
                    .await;
                if !stored {
                    self.evict(&key);
                }
                Ok(stored)
            }
        }
    }

    /// Stores a value without expiration.
    pub async fn forever(&self, key: &str, value: Value) -> Result<bool> {
        self.put(key, value, None).await
    }

    /// Stores several values with the same TTL.
    pub async fn put_many(
        &self,
        values: impl IntoIterator<Item = (String, Value)>,
        ttl: Option<i64>,
    ) -> Result<bool> {
        let mut all_stored = true;
        for (key, value) in values {
            all_stored &= self.put(&key, value, ttl).await?;
        }
        Ok(all_stored)
    }

    // == Add ==
    /// Stores a value only if the key is absent or expired.
    ///
    /// Secondaries always wait for the primary's verdict. L1 only learns the
    /// value when it was actually inserted.
    pub async fn add(&self, key: &str, value: Value, ttl: Option<i64>) -> Result<bool> {
        let key = self.prefixed(key);

        let inserted = match &self.backend {
            Backend::Primary { store, .. } => {
                let (store, stored_key, stored_value) = (store.clone(), key.clone(), value.clone());
                blocking(move || store.add(&stored_key, &stored_value, ttl)).await?
            }
            Backend::Secondary { client } => {
                let endpoint = format!("add/{}", encode_key(&key));
                let payload = serde_json::to_value(PutRequest {
                    value: value.clone(),
                    ttl,
                })?;
                parse::<AddResponse>(client.request(Method::POST, &endpoint, Some(payload)).await)
                    .is_some_and(|response| response.added)
            }
        };

        if inserted {
            self.remember(&key, &value);
        }
        Ok(inserted)
    }

    // == Counters ==
    /// Adds `by` to a numeric value and stores the result without expiration.
    ///
    /// This is a read followed by a write; concurrent increments of the same
    /// key can lose updates. A missing key counts as 0.
    pub async fn increment(&self, key: &str, by: i64) -> Result<i64> {
        let current = match self.get(key).await? {
            Some(value) => codec::as_counter(&value).ok_or_else(|| {
                CacheError::InvalidRequest(format!("value at '{}' is not numeric", key))
            })?,
            None => 0,
        };

        let next = current.saturating_add(by);
        self.put(key, json!(next), None).await?;
        Ok(next)
    }

    pub async fn decrement(&self, key: &str, by: i64) -> Result<i64> {
        self.increment(key, by.saturating_neg()).await
    }

    // == Forget ==
    /// Removes a key. Removing a missing key still succeeds.
    pub async fn forget(&self, key: &str) -> Result<bool> {
        let key = self.prefixed(key);
        self.evict(&key);

        match &self.backend {
            Backend::Primary { store, .. } => {
                let store = store.clone();
                blocking(move || store.forget(&key)).await?;
                Ok(true)
            }
            Backend::Secondary { client } => {
                let endpoint = format!("cache/{}", encode_key(&key));
                Ok(self.forward_write(client, Method::DELETE, &endpoint, None).await)
            }
        }
    }

    // == Flush ==
    /// Removes every entry, regardless of prefix.
    pub async fn flush(&self) -> Result<bool> {
        if let Some(l1) = &self.l1 {
            l1.clear();
        }

        match &self.backend {
            Backend::Primary { store, .. } => {
                let store = store.clone();
                blocking(move || store.flush()).await?;
                Ok(true)
            }
            Backend::Secondary { client } => {
                Ok(self.forward_write(client, Method::DELETE, "cache", None).await)
            }
        }
    }

    // == Locks ==
    /// Takes `key` for `owner` for `ttl` seconds if it is free or expired.
    pub async fn acquire_lock(&self, key: &str, owner: &str, ttl: i64) -> Result<bool> {
        let key = self.prefixed(key);

        match &self.backend {
            Backend::Primary { locks, .. } => {
                let (locks, owner) = (locks.clone(), owner.to_string());
                blocking(move || locks.acquire(&key, &owner, ttl)).await
            }
            Backend::Secondary { client } => {
                let endpoint = format!("lock/{}", encode_key(&key));
                let payload = serde_json::to_value(LockRequest {
                    owner: owner.to_string(),
                    ttl,
                })?;
                Ok(
                    parse::<LockResponse>(client.request(Method::POST, &endpoint, Some(payload)).await)
                        .is_some_and(|response| response.acquired),
                )
            }
        }
    }

    /// Releases `key` if `owner` holds it.
    pub async fn release_lock(&self, key: &str, owner: &str) -> Result<bool> {
        let key = self.prefixed(key);

        match &self.backend {
            Backend::Primary { locks, .. } => {
                let (locks, owner) = (locks.clone(), owner.to_string());
                blocking(move || locks.release(&key, &owner)).await
            }
            Backend::Secondary { client } => {
                let endpoint = format!("lock/{}", encode_key(&key));
                let payload = serde_json::to_value(ReleaseLockRequest {
                    owner: owner.to_string(),
                })?;
                Ok(parse::<ReleaseLockResponse>(
                    client.request(Method::DELETE, &endpoint, Some(payload)).await,
                )
                .is_some_and(|response| response.released))
            }
        }
    }

    /// Current holder of a lock.
    ///
    /// Only a primary can answer; secondaries always report `None`.
    pub async fn lock_owner(&self, key: &str) -> Result<Option<String>> {
        match &self.backend {
            Backend::Primary { locks, .. } => {
                let (locks, key) = (locks.clone(), self.prefixed(key));
                blocking(move || locks.owner(&key)).await
            }
            Backend::Secondary { .. } => {
                debug!("Lock owner lookup for '{}' is not served by a secondary", key);
                Ok(None)
            }
        }
    }

    /// Handle for a named lock with a fresh random owner unless one is given.
    pub fn lock(&self, name: impl Into<String>, seconds: i64, owner: Option<String>) -> CacheLock<'_> {
        CacheLock::new(self, name.into(), seconds, owner)
    }

    /// Handle for a lock previously taken by `owner`, e.g. in another process.
    pub fn restore_lock(&self, name: impl Into<String>, owner: impl Into<String>) -> CacheLock<'_> {
        CacheLock::new(self, name.into(), 0, Some(owner.into()))
    }

    // == Ping ==
    /// Reports this node (primary) or asks the primary (secondary).
    ///
    /// `None` means the primary could not be reached.
    pub async fn ping(&self) -> Option<PingResponse> {
        match &self.backend {
            Backend::Primary { .. } => Some(PingResponse::pong(
                self.role().as_str(),
                local_hostname(),
            )),
            Backend::Secondary { client } => parse(client.request(Method::GET, "ping", None).await),
        }
    }

    // == Drain ==
    /// Waits for outstanding fire-and-forget writes, discarding outcomes.
    ///
    /// Call at the end of each unit of work. Returns how many were drained.
    pub async fn drain(&self) -> usize {
        match &self.backend {
            Backend::Primary { .. } => 0,
            Backend::Secondary { client } => client.drain().await,
        }
    }

    /// Fire-and-forget writes dispatched but not yet drained.
    pub fn pending(&self) -> usize {
        match &self.backend {
            Backend::Primary { .. } => 0,
            Backend::Secondary { client } => client.pending(),
        }
    }
}

/// Runs a SQLite call on the blocking pool.
///
/// A write can wait out the busy timeout on another process's lock; that
/// wait must not hold a runtime worker.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| CacheError::Internal(format!("storage task failed: {}", err)))?
}

fn parse<T: DeserializeOwned>(body: Option<Value>) -> Option<T> {
    body.and_then(|body| serde_json::from_value(body).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn primary_router() -> (TempDir, CacheRouter) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        (dir, CacheRouter::primary(db, GcPolicy::disabled()))
    }

    #[tokio::test]
    async fn test_put_get_forget() {
        let (_dir, router) = primary_router();

        assert!(router.put("a", json!("1"), Some(60)).await.unwrap());
        assert_eq!(router.get("a").await.unwrap(), Some(json!("1")));

        assert!(router.forget("a").await.unwrap());
        assert_eq!(router.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_prefix_applied_to_store_keys() {
        let (_dir, router) = primary_router();
        let router = router.with_prefix("app:");

        router.put("user", json!({"id": 1}), None).await.unwrap();

        let store = router.store().unwrap();
        assert_eq!(store.get("app:user").unwrap(), Some(json!({"id": 1})));
        assert_eq!(store.get("user").unwrap(), None);
        assert_eq!(router.l1().unwrap().get("app:user"), Some(json!({"id": 1})));
    }

    #[tokio::test]
    async fn test_l1_serves_stale_value_until_invalidated() {
        let (_dir, router) = primary_router();

        router.put("k", json!("cached"), Some(60)).await.unwrap();
        // Another process removes the row behind this router's back
        router.store().unwrap().forget("k").unwrap();

        assert_eq!(router.get("k").await.unwrap(), Some(json!("cached")));

        router.forget("k").await.unwrap();
        assert_eq!(router.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_without_l1_reads_store() {
        let (_dir, router) = primary_router();
        let router = router.with_l1(false);

        router.put("k", json!(1), None).await.unwrap();
        router.store().unwrap().forget("k").unwrap();

        assert!(router.l1().is_none());
        assert_eq!(router.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_populates_l1_from_store() {
        let (_dir, router) = primary_router();
        router.store().unwrap().put("k", &json!([1, 2]), None).unwrap();

        assert_eq!(router.get("k").await.unwrap(), Some(json!([1, 2])));
        assert_eq!(router.l1().unwrap().get("k"), Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_add_conflict_keeps_first_value() {
        let (_dir, router) = primary_router();

        assert!(router.add("k", json!("v"), Some(60)).await.unwrap());
        assert!(!router.add("k", json!("v2"), Some(60)).await.unwrap());
        assert_eq!(router.get("k").await.unwrap(), Some(json!("v")));
    }

    #[tokio::test]
    async fn test_add_replaces_after_expiry() {
        let (_dir, router) = primary_router();
        let router = router.with_l1(false);

        assert!(router.add("k", json!("v"), Some(1)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(2100)).await;

        assert_eq!(router.get("k").await.unwrap(), None);
        assert!(router.add("k", json!("v2"), Some(60)).await.unwrap());
        assert_eq!(router.get("k").await.unwrap(), Some(json!("v2")));
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let (_dir, router) = primary_router();

        router.put("k", json!("v"), Some(60)).await.unwrap();
        router.put("k", json!("v"), Some(60)).await.unwrap();

        assert_eq!(router.get("k").await.unwrap(), Some(json!("v")));
        assert_eq!(router.store().unwrap().len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_flush_clears_l1_and_store() {
        let (_dir, router) = primary_router();
        router.put("a", json!(1), None).await.unwrap();
        router.put("b", json!(2), None).await.unwrap();

        assert!(router.flush().await.unwrap());
        assert!(router.l1().unwrap().is_empty());
        assert_eq!(router.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment_and_decrement() {
        let (_dir, router) = primary_router();

        assert_eq!(router.increment("hits", 1).await.unwrap(), 1);
        assert_eq!(router.increment("hits", 5).await.unwrap(), 6);
        assert_eq!(router.decrement("hits", 2).await.unwrap(), 4);
        assert_eq!(router.get("hits").await.unwrap(), Some(json!(4)));
    }

    #[tokio::test]
    async fn test_increment_rejects_non_numeric() {
        let (_dir, router) = primary_router();
        router.put("name", json!("alice"), None).await.unwrap();

        let result = router.increment("name", 1).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_increment_rejects_fractional_value() {
        let (_dir, router) = primary_router();
        router.put("ratio", json!(2.5), None).await.unwrap();

        let result = router.increment("ratio", 1).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
        assert_eq!(router.get("ratio").await.unwrap(), Some(json!(2.5)));
    }

    #[tokio::test]
    async fn test_many_and_put_many() {
        let (_dir, router) = primary_router();

        let stored = router
            .put_many(
                vec![("a".to_string(), json!(1)), ("b".to_string(), json!(2))],
                Some(60),
            )
            .await
            .unwrap();
        assert!(stored);

        let values = router.many(&["a", "b", "c"]).await.unwrap();
        assert_eq!(values["a"], Some(json!(1)));
        assert_eq!(values["b"], Some(json!(2)));
        assert_eq!(values["c"], None);
    }

    #[tokio::test]
    async fn test_lock_exclusion_and_release() {
        let (_dir, router) = primary_router();

        assert!(router.acquire_lock("job", "owner-a", 10).await.unwrap());
        assert!(!router.acquire_lock("job", "owner-b", 10).await.unwrap());
        assert!(!router.release_lock("job", "owner-b").await.unwrap());
        assert_eq!(router.lock_owner("job").await.unwrap().as_deref(), Some("owner-a"));

        assert!(router.release_lock("job", "owner-a").await.unwrap());
        assert_eq!(router.lock_owner("job").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ping_primary() {
        let (_dir, router) = primary_router();

        let pong = router.ping().await.unwrap();
        assert_eq!(pong.message, "pong");
        assert_eq!(pong.role, "primary");
        assert_eq!(router.drain().await, 0);
    }

    #[tokio::test]
    async fn test_secondary_does_not_serve_lock_owner() {
        let client =
            ReplicationClient::new("http://127.0.0.1:9", "t", Duration::from_millis(200)).unwrap();
        let router = CacheRouter::secondary(client);

        assert_eq!(router.role(), Role::Secondary);
        assert!(router.store().is_none());
        assert_eq!(router.lock_owner("job").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_from_config_primary() {
        let dir = tempdir().unwrap();
        let config = Config {
            sqlite_path: dir.path().join("db"),
            prefix: "svc:".to_string(),
            ..Config::default()
        };

        let router = CacheRouter::from_config(&config).unwrap();
        assert_eq!(router.role(), Role::Primary);
        assert_eq!(router.prefix(), "svc:");
        assert!(router.is_async());
        assert!(dir.path().join("db").join(crate::cache::DATABASE_FILE).exists());
    }

    #[tokio::test]
    async fn test_busy_database_does_not_stall_runtime() {
        let (dir, router) = primary_router();

        // Another process holds the write lock for a while.
        let blocker = rusqlite::Connection::open(dir.path().join(crate::cache::DATABASE_FILE)).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE").unwrap();
        let holder = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(400));
            blocker.execute_batch("COMMIT").unwrap();
        });

        let ticker = tokio::spawn(tokio::time::sleep(Duration::from_millis(50)));

        assert!(router.put("k", json!(1), None).await.unwrap());
        assert!(ticker.is_finished(), "runtime was blocked while the write waited");

        holder.join().unwrap();
        assert_eq!(router.get("k").await.unwrap(), Some(json!(1)));
    }
}
