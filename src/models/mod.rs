//! Request and Response models for the node API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies on both the
//! serving and the forwarding side.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{LockRequest, PutRequest, ReleaseLockRequest};
pub use responses::{
    AddResponse, ErrorResponse, LockResponse, PingResponse, ReleaseLockResponse, SuccessResponse,
};
