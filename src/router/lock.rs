//! Named lock handle bound to one owner.

use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::time::{sleep, Instant};

use super::CacheRouter;
use crate::error::Result;

/// TTL used when a lock is requested without one (one day)
pub const FOREVER_LOCK_SECONDS: i64 = 86_400;

/// Delay between attempts in [`CacheLock::block`]
const BLOCK_RETRY_INTERVAL: Duration = Duration::from_millis(250);

const OWNER_LENGTH: usize = 16;

// == Cache Lock ==
#[derive(Debug)]
pub struct CacheLock<'a> {
    router: &'a CacheRouter,
    name: String,
    seconds: i64,
    owner: String,
}

impl<'a> CacheLock<'a> {
    pub(crate) fn new(router: &'a CacheRouter, name: String, seconds: i64, owner: Option<String>) -> Self {
        Self {
            router,
            name,
            seconds,
            owner: owner.unwrap_or_else(random_owner),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn ttl(&self) -> i64 {
        if self.seconds > 0 {
            self.seconds
        } else {
            FOREVER_LOCK_SECONDS
        }
    }

    /// Tries once to take the lock.
    pub async fn acquire(&self) -> Result<bool> {
        self.router.acquire_lock(&self.name, &self.owner, self.ttl()).await
    }

    /// Releases the lock if this handle's owner holds it.
    pub async fn release(&self) -> Result<bool> {
        self.router.release_lock(&self.name, &self.owner).await
    }

    /// Retries [`CacheLock::acquire`] until it succeeds or `wait` elapses.
    pub async fn block(&self, wait: Duration) -> Result<bool> {
        let deadline = Instant::now() + wait;

        loop {
            if self.acquire().await? {
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            sleep(BLOCK_RETRY_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Whether the stored owner is this handle's owner. Always false on a secondary.
    pub async fn is_owned_by_current_process(&self) -> Result<bool> {
        let owner = self.router.lock_owner(&self.name).await?;
        Ok(owner.as_deref() == Some(self.owner.as_str()))
    }
}

fn random_owner() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(OWNER_LENGTH)
        .map(char::from)
        .collect()
}
