//! Scoped configuration lock
//!
//! `ConfigLockGuard` releases its lock when dropped. If the release fails
//! during drop, a warning is logged but no panic occurs; call `release()` to
//! handle the error explicitly.

use tracing::warn;

use cfglock_common::{LockKind, Result};

use super::ConfigurationLock;

#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ConfigLockGuard<'a, L: ConfigurationLock + ?Sized> {
    lock: &'a L,
    kind: LockKind,
    released: bool,
}

impl<'a, L: ConfigurationLock + ?Sized> ConfigLockGuard<'a, L> {
    /// Acquire `kind` on `lock`, blocking as `lock` does
    pub fn acquire(lock: &'a L, kind: LockKind) -> Result<Self> {
        lock.lock(kind)?;
        Ok(Self::held(lock, kind))
    }

    /// Try to acquire `kind` on `lock`; `None` when it is not available
    pub fn try_acquire(lock: &'a L, kind: LockKind) -> Result<Option<Self>> {
        if lock.try_lock(kind)? {
            Ok(Some(Self::held(lock, kind)))
        } else {
            Ok(None)
        }
    }

    fn held(lock: &'a L, kind: LockKind) -> Self {
        Self {
            lock,
            kind,
            released: false,
        }
    }

    pub fn kind(&self) -> LockKind {
        self.kind
    }

    /// Release the lock now and report any release failure
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.lock.unlock()
    }
}

impl<L: ConfigurationLock + ?Sized> std::fmt::Debug for ConfigLockGuard<'_, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigLockGuard")
            .field("kind", &self.kind)
            .field("released", &self.released)
            .finish()
    }
}

impl<L: ConfigurationLock + ?Sized> Drop for ConfigLockGuard<'_, L> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.lock.unlock()
        {
            warn!(kind = %self.kind, error = %e, "Failed to release configuration lock");
        }
    }
}
