//! Request DTOs for the node API
//!
//! Defines the structure of incoming HTTP request bodies. The replication
//! client serializes the same types when forwarding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `POST /cache/{key}` and `POST /add/{key}`
///
/// # Fields
/// - `value`: The value to store (any JSON document)
/// - `ttl`: Optional TTL in seconds; missing or non-positive never expires
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutRequest {
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub ttl: Option<i64>,
}

/// Request body for `POST /lock/{key}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRequest {
    pub owner: String,
    #[serde(default)]
    pub ttl: i64,
}

impl LockRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.owner.is_empty() {
            return Some("Lock owner cannot be empty".to_string());
        }
        None
    }
}

/// Request body for `DELETE /lock/{key}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseLockRequest {
    pub owner: String,
}
