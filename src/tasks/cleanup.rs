//! Expiry Sweep Task
//!
//! Background task that periodically deletes expired rows from the
//! primary's cache table, alongside the probabilistic GC on writes.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::cache::PersistentStore;

/// Spawns a task that calls [`PersistentStore::purge_expired`] every
/// `cleanup_interval_secs` seconds.
///
/// Sweep failures are logged and the loop keeps going. The returned handle
/// is aborted on shutdown.
pub fn spawn_cleanup_task(store: PersistentStore, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let sweep = store.clone();
            match tokio::task::spawn_blocking(move || sweep.purge_expired()).await {
                Ok(Ok(0)) => debug!("Expiry sweep: no expired entries found"),
                Ok(Ok(removed)) => info!("Expiry sweep: removed {} expired entries", removed),
                Ok(Err(e)) => error!("Expiry sweep failed: {}", e),
                Err(e) => error!("Expiry sweep task failed: {}", e),
            }
        }
    })
}
