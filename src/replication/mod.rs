//! Replication Module
//!
//! Outbound HTTP calls from a secondary node to its primary.

mod client;

pub use client::{encode_key, ReplicationClient, MAX_PENDING, SERVER_ID_HEADER, TOKEN_HEADER};
pub use reqwest::Method;
