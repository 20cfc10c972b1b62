//! Replication Client
//!
//! Sends operations to the primary's HTTP API. Synchronous requests wait up to
//! the configured timeout and hand back the parsed body; fire-and-forget
//! requests are spawned, tracked, and drained later with their outcome
//! discarded. Transport failures never become errors: a synchronous caller
//! sees `None`, an asynchronous one sees nothing at all.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::local_hostname;
use crate::error::{CacheError, Result};

/// Header carrying the shared secret
pub const TOKEN_HEADER: &str = "X-Hypercache-Token";

/// Header identifying the sending node
pub const SERVER_ID_HEADER: &str = "X-Hypercache-Server-ID";

/// Outstanding fire-and-forget dispatches kept per client
pub const MAX_PENDING: usize = 256;

/// Characters escaped when a key is placed in a path segment
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Escapes `key` for use as a single URL path segment.
pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ENCODE_SET).to_string()
}

// == Replication Client ==
#[derive(Debug)]
pub struct ReplicationClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    server_id: String,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl ReplicationClient {
    /// Creates a client for the API rooted at `base_url`.
    ///
    /// `timeout` bounds every request, synchronous or not.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CacheError::Config(format!("failed to build HTTP client: {}", err)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            server_id: local_hostname(),
            pending: Mutex::new(Vec::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_builder(&self, method: Method, endpoint: &str, payload: Option<&Value>) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, endpoint);
        let builder = self
            .http
            .request(method, url)
            .header(TOKEN_HEADER, &self.token)
            .header(SERVER_ID_HEADER, &self.server_id);

        match payload {
            Some(body) => builder.json(body),
            None => builder,
        }
    }

    fn pending_handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // == Synchronous ==
    /// Sends a request and waits for the parsed JSON body.
    ///
    /// Returns `None` on network failure, timeout, non-success status, an
    /// unparsable body, or a JSON `null` body.
    pub async fn request(&self, method: Method, endpoint: &str, payload: Option<Value>) -> Option<Value> {
        let response = match self
            .request_builder(method.clone(), endpoint, payload.as_ref())
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!("Replication {} /{} failed: {}", method, endpoint, err);
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("Replication {} /{} rejected with {}", method, endpoint, status);
            return None;
        }

        match response.json::<Value>().await {
            Ok(Value::Null) => None,
            Ok(body) => Some(body),
            Err(err) => {
                warn!("Replication {} /{} returned an unreadable body: {}", method, endpoint, err);
                None
            }
        }
    }

    // == Fire-and-Forget ==
    /// Spawns a request without waiting for it.
    ///
    /// Finished dispatches are reaped first; when [`MAX_PENDING`] are still
    /// in flight the oldest is awaited before the new one is tracked.
    pub async fn dispatch(&self, method: Method, endpoint: &str, payload: Option<Value>) {
        let request = self.request_builder(method.clone(), endpoint, payload.as_ref());
        let label = format!("{} /{}", method, endpoint);

        let handle = tokio::spawn(async move {
            match request.send().await {
                Ok(response) => debug!("Async replication {} finished with {}", label, response.status()),
                Err(err) => debug!("Async replication {} dropped: {}", label, err),
            }
        });

        let oldest = {
            let mut pending = self.pending_handles();
            pending.retain(|handle| !handle.is_finished());
            let oldest = if pending.len() >= MAX_PENDING {
                Some(pending.remove(0))
            } else {
                None
            };
            pending.push(handle);
            oldest
        };

        if let Some(oldest) = oldest {
            let _ = oldest.await;
        }
    }

    /// Number of tracked dispatches not yet drained.
    pub fn pending(&self) -> usize {
        self.pending_handles().len()
    }

    // == Drain ==
    /// Awaits every tracked dispatch, ignoring outcomes.
    ///
    /// Returns how many were drained.
    pub async fn drain(&self) -> usize {
        let handles = std::mem::take(&mut *self.pending_handles());
        let count = handles.len();

        for handle in handles {
            let _ = handle.await;
        }

        if count > 0 {
            debug!("Drained {} pending replication requests", count);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key("plain_key-1.0"), "plain_key-1.0");
        assert_eq!(encode_key("app:user/7"), "app%3Auser%2F7");
        assert_eq!(encode_key("a b"), "a%20b");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ReplicationClient::new("http://primary/api/", "t", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://primary/api");
    }

    #[tokio::test]
    async fn test_unreachable_peer_yields_none() {
        // Port 9 (discard) on loopback is expected to refuse connections
        let client = ReplicationClient::new("http://127.0.0.1:9", "t", Duration::from_millis(500)).unwrap();
        assert_eq!(client.request(Method::GET, "cache/k", None).await, None);
    }

    #[tokio::test]
    async fn test_async_failure_is_discarded_and_drained() {
        let client = ReplicationClient::new("http://127.0.0.1:9", "t", Duration::from_millis(500)).unwrap();

        client.dispatch(Method::POST, "cache/k", Some(serde_json::json!({"value": 1}))).await;
        client.dispatch(Method::DELETE, "cache/k", None).await;

        assert!(client.pending() <= 2);
        client.drain().await;
        assert_eq!(client.pending(), 0);
    }
}
