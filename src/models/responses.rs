//! Response DTOs for the node API
//!
//! Defines the structure of outgoing HTTP response bodies. Secondaries parse
//! the primary's replies back into these types.

use serde::{Deserialize, Serialize};

/// Response body for put, forget and flush
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Response body for `POST /add/{key}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddResponse {
    pub added: bool,
}

/// Response body for `POST /lock/{key}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockResponse {
    pub acquired: bool,
}

/// Response body for `DELETE /lock/{key}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseLockResponse {
    pub released: bool,
}

/// Response body for the ping endpoint (GET /ping)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResponse {
    /// Always "pong"
    pub message: String,
    /// Role of the answering node
    pub role: String,
    pub hostname: String,
    /// Unix timestamp in seconds
    pub time: i64,
}

impl PingResponse {
    /// Creates a PingResponse with the current timestamp
    pub fn pong(role: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            message: "pong".to_string(),
            role: role.into(),
            hostname: hostname.into(),
            time: chrono::Utc::now().timestamp(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}
