//! Per-thread cluster lock tracking
//!
//! A `ClusterLockTracker` records how many nested write acquisitions a thread
//! made under the cluster lock, and owns the provider handle while that count
//! is positive. `ClusterLockRegistry` maps thread identity to tracker.

use std::thread::{self, ThreadId};

use dashmap::DashMap;
use tracing::debug;

use cfglock_common::{LockError, Result};

use super::provider::{LockHandle, LockProvider};

/// Cluster lock state of a single thread
///
/// Invariant: `handle` is present iff `write_hold_count > 0`.
#[derive(Debug, Default)]
pub struct ClusterLockTracker {
    write_hold_count: u32,
    handle: Option<Box<dyn LockHandle>>,
}

impl ClusterLockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take one more write hold, acquiring the cluster lock on the first one
    ///
    /// The first hold blocks until the provider grants the lock.
    pub fn lock(&mut self, provider: &dyn LockProvider, name: &str) -> Result<()> {
        if self.write_hold_count == 0 {
            let handle = provider
                .acquire(name)
                .map_err(|source| LockError::ProviderAcquire {
                    name: name.to_string(),
                    source,
                })?;
            self.handle = Some(handle);
        }
        self.write_hold_count += 1;
        Ok(())
    }

    /// Like `lock`, but gives up if the cluster lock is held elsewhere
    pub fn try_lock(&mut self, provider: &dyn LockProvider, name: &str) -> Result<bool> {
        if self.write_hold_count == 0 {
            let handle = provider
                .try_acquire(name)
                .map_err(|source| LockError::ProviderAcquire {
                    name: name.to_string(),
                    source,
                })?;
            match handle {
                Some(handle) => self.handle = Some(handle),
                None => return Ok(false),
            }
        }
        self.write_hold_count += 1;
        Ok(true)
    }

    /// Drop one write hold, releasing the cluster lock on the last one
    ///
    /// Returns `true` when the cluster lock was released and the tracker can
    /// be discarded. Without a held lock this does nothing.
    pub fn unlock(&mut self) -> Result<bool> {
        if self.handle.is_none() {
            return Ok(false);
        }

        self.write_hold_count = self.write_hold_count.saturating_sub(1);
        if self.write_hold_count > 0 {
            return Ok(false);
        }

        match self.handle.take() {
            Some(handle) => {
                let name = handle.name().to_string();
                handle
                    .release()
                    .map_err(|source| LockError::ProviderRelease { name, source })?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_write_locked(&self) -> bool {
        self.handle.is_some()
    }

    pub fn hold_count(&self) -> u32 {
        self.write_hold_count
    }

    /// Release the cluster lock whatever the recorded hold count says
    ///
    /// Only for recovery after local and cluster state diverged.
    pub fn force_unlock(&mut self) -> Result<()> {
        self.write_hold_count = 1;
        let result = self.unlock();
        self.write_hold_count = 0;
        result.map(|_| ())
    }
}

/// Trackers of all threads currently holding (or taking) the cluster lock
///
/// Each tracker is only touched by its owning thread. Operations check the
/// tracker out of the map, so no map guard is held across a provider call.
#[derive(Debug, Default)]
pub struct ClusterLockRegistry {
    trackers: DashMap<ThreadId, ClusterLockTracker>,
}

impl ClusterLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on the current thread's tracker, creating it if needed
    ///
    /// The tracker is kept only while it still holds the cluster lock.
    pub fn with_current<R>(&self, f: impl FnOnce(&mut ClusterLockTracker) -> R) -> R {
        let thread = thread::current().id();
        let mut tracker = self
            .trackers
            .remove(&thread)
            .map(|(_, tracker)| tracker)
            .unwrap_or_default();

        let result = f(&mut tracker);

        if tracker.hold_count() > 0 || tracker.is_write_locked() {
            self.trackers.insert(thread, tracker);
        } else {
            debug!(?thread, "Cluster lock tracker discarded");
        }
        result
    }

    /// Remove and return the current thread's tracker
    pub fn discard_current(&self) -> Option<ClusterLockTracker> {
        self.trackers
            .remove(&thread::current().id())
            .map(|(_, tracker)| tracker)
    }

    pub fn is_write_locked(&self) -> bool {
        self.trackers
            .get(&thread::current().id())
            .map(|tracker| tracker.is_write_locked())
            .unwrap_or(false)
    }

    pub fn hold_count(&self) -> u32 {
        self.trackers
            .get(&thread::current().id())
            .map(|tracker| tracker.hold_count())
            .unwrap_or(0)
    }

    /// Number of threads with a live tracker
    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}
