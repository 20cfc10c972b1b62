//! Configuration Module
//!
//! Handles loading and managing node configuration from environment variables.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

// == Role ==
/// Whether this node owns the persistent store or forwards to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Serves every operation from the local SQLite store
    #[default]
    Primary,
    /// Owns no store; forwards operations to the primary over HTTP
    Secondary,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(Role::Primary),
            "secondary" => Ok(Role::Secondary),
            other => Err(CacheError::Config(format!("unknown role '{}'", other))),
        }
    }
}

/// Node configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Node role
    pub role: Role,
    /// Base URL of the primary's API (used by secondaries)
    pub primary_url: String,
    /// Shared secret sent and checked in the token header
    pub api_token: String,
    /// Replication request timeout in seconds
    pub timeout_secs: u64,
    /// Forward writes fire-and-forget instead of waiting for the primary
    pub async_requests: bool,
    /// Directory holding the SQLite database file
    pub sqlite_path: PathBuf,
    /// Prefix applied to every key
    pub prefix: String,
    /// Path the boundary routes are mounted under
    pub api_path: String,
    /// HTTP bind host
    pub host: String,
    /// HTTP server port
    pub server_port: u16,
    /// Probability that a primary `put` sweeps expired rows
    pub gc_probability: f64,
    /// Periodic sweep interval in seconds, 0 disables it
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `HYPERCACHE_ROLE` - `primary` or `secondary` (default: primary)
    /// - `HYPERCACHE_PRIMARY_URL` - Primary API base URL
    /// - `HYPERCACHE_API_TOKEN` - Shared secret (default: empty)
    /// - `HYPERCACHE_TIMEOUT` - Replication timeout in seconds (default: 1)
    /// - `HYPERCACHE_ASYNC` - Fire-and-forget writes (default: true)
    /// - `HYPERCACHE_SQLITE_PATH` - Database directory (default: ./storage/hypercache)
    /// - `HYPERCACHE_PREFIX` - Key prefix (default: empty)
    /// - `HYPERCACHE_API_PATH` - Route mount path (default: /api/hypercache)
    /// - `HYPERCACHE_HOST` - Bind host (default: 0.0.0.0)
    /// - `HYPERCACHE_PORT` - HTTP server port (default: 8080)
    /// - `HYPERCACHE_GC_PROBABILITY` - Sweep probability per put (default: 0.01)
    /// - `HYPERCACHE_CLEANUP_INTERVAL` - Periodic sweep seconds (default: 0)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let role = match env::var("HYPERCACHE_ROLE") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.role,
        };

        Ok(Self {
            role,
            primary_url: env::var("HYPERCACHE_PRIMARY_URL").unwrap_or(defaults.primary_url),
            api_token: env::var("HYPERCACHE_API_TOKEN").unwrap_or(defaults.api_token),
            timeout_secs: parse_env("HYPERCACHE_TIMEOUT").unwrap_or(defaults.timeout_secs),
            async_requests: env::var("HYPERCACHE_ASYNC")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.async_requests),
            sqlite_path: env::var("HYPERCACHE_SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.sqlite_path),
            prefix: env::var("HYPERCACHE_PREFIX").unwrap_or(defaults.prefix),
            api_path: env::var("HYPERCACHE_API_PATH").unwrap_or(defaults.api_path),
            host: env::var("HYPERCACHE_HOST").unwrap_or(defaults.host),
            server_port: parse_env("HYPERCACHE_PORT").unwrap_or(defaults.server_port),
            gc_probability: parse_env("HYPERCACHE_GC_PROBABILITY")
                .unwrap_or(defaults.gc_probability),
            cleanup_interval: parse_env("HYPERCACHE_CLEANUP_INTERVAL")
                .unwrap_or(defaults.cleanup_interval),
        })
    }

    /// Checks the settings a node cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.role == Role::Secondary
            && !(self.primary_url.starts_with("http://") || self.primary_url.starts_with("https://"))
        {
            return Err(CacheError::Config(format!(
                "secondary nodes need an http(s) primary URL, got '{}'",
                self.primary_url
            )));
        }

        if !(0.0..=1.0).contains(&self.gc_probability) {
            return Err(CacheError::Config(format!(
                "gc probability must be within [0, 1], got {}",
                self.gc_probability
            )));
        }

        Ok(())
    }

    /// Replication request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::Primary,
            primary_url: "http://127.0.0.1:8080/api/hypercache".to_string(),
            api_token: String::new(),
            timeout_secs: 1,
            async_requests: true,
            sqlite_path: PathBuf::from("storage/hypercache"),
            prefix: String::new(),
            api_path: "/api/hypercache".to_string(),
            host: "0.0.0.0".to_string(),
            server_port: 8080,
            gc_probability: 0.01,
            cleanup_interval: 0,
        }
    }
}

/// Name reported in pings and in the server-ID header.
pub fn local_hostname() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string())
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
