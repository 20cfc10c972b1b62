//! Background Tasks Module
//!
//! # Tasks
//! - Expiry sweep: deletes expired cache rows on the primary at a fixed interval

mod cleanup;

pub use cleanup::spawn_cleanup_task;
