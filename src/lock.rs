//! Lock Coordinator
//!
//! Advisory, time-boxed write lock scoped to a whole index namespace.
//!
//! ## Acquisition
//! ```text
//! loop:
//!   index_is_locked? ── yes ──► waited > max_wait? ── yes ──► LockTimeout
//!        │ no                          │ no
//!        ▼                             └──► sleep(poll_interval), retry
//!   lock_index ── backed off ──► sleep, retry
//!        │ placed
//!        ▼
//!   IndexLock (released on drop)
//! ```
//!
//! The lock is cooperative: nothing stops a caller that skips it. A holder
//! that crashes leaves a marker that simply expires.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::LockSettings;
use crate::error::{PageKvError, Result};
use crate::storage::StorageDriver;

/// Acquires index locks by polling the driver
#[derive(Debug, Clone, Copy)]
pub struct LockCoordinator {
    poll_interval: Duration,
    max_wait: Duration,
}

impl LockCoordinator {
    pub fn new(settings: LockSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval,
            max_wait: settings.max_wait,
        }
    }

    /// Block until the lock on `index_name` is held, or `max_wait` elapses
    pub fn acquire(&self, driver: &Arc<dyn StorageDriver>, index_name: &str) -> Result<IndexLock> {
        let started = Instant::now();
        let mut attempts: u32 = 0;
        loop {
            let status = driver.index_is_locked(index_name)?;
            if !status.locked {
                if let Some(expires_at_ms) = driver.lock_index(index_name)? {
                    if attempts > 0 {
                        tracing::debug!(
                            index = index_name,
                            attempts,
                            waited_ms = started.elapsed().as_millis() as u64,
                            "acquired contended lock"
                        );
                    }
                    return Ok(IndexLock {
                        driver: Arc::clone(driver),
                        index_name: index_name.to_string(),
                        expires_at_ms,
                        released: false,
                    });
                }
            }

            let waited = started.elapsed();
            if waited >= self.max_wait {
                tracing::warn!(index = index_name, attempts, "gave up waiting for lock");
                return Err(PageKvError::LockTimeout {
                    index: index_name.to_string(),
                    waited_ms: waited.as_millis() as u64,
                });
            }
            attempts += 1;
            thread::sleep(self.poll_interval + jitter(self.poll_interval));
        }
    }
}

/// Up to one extra poll interval, so two callers that backed off together
/// do not retry in lockstep
fn jitter(interval: Duration) -> Duration {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0) as u64;
    let span = interval.as_nanos().max(1) as u64;
    Duration::from_nanos(nanos % span)
}

/// A held index lock
///
/// Call `release` to observe release errors; dropping the guard releases it
/// too and logs any failure.
#[must_use = "the index is unlocked as soon as the guard is dropped"]
pub struct IndexLock {
    driver: Arc<dyn StorageDriver>,
    index_name: String,
    expires_at_ms: u64,
    released: bool,
}

impl IndexLock {
    pub fn expires_at_ms(&self) -> u64 {
        self.expires_at_ms
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.driver.release_lock(&self.index_name, self.expires_at_ms)
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.driver.release_lock(&self.index_name, self.expires_at_ms) {
            tracing::warn!(index = %self.index_name, error = %e, "failed to release lock");
        }
    }
}

impl std::fmt::Debug for IndexLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexLock")
            .field("index_name", &self.index_name)
            .field("expires_at_ms", &self.expires_at_ms)
            .finish()
    }
}
