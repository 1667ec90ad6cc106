//! Configuration Lock
//!
//! Serializes writes to the shared configuration store:
//! - Local reentrant read/write lock (per process)
//! - External lock provider contract and implementations (per cluster)
//! - Per-thread cluster lock tracking
//! - Cluster-aware lock combining both, with divergence detection
//! - Scoped guards

mod cluster;
mod guard;
mod local;
pub mod provider;
mod settings;
mod tracker;

pub use cluster::ClusterConfigurationLock;
pub use guard::ConfigLockGuard;
pub use local::LocalConfigurationLock;
pub use provider::{FileLockProvider, LockHandle, LockHolder, LockProvider, MemoryLockProvider};
pub use settings::{LockSettings, ProviderKind};
pub use tracker::{ClusterLockRegistry, ClusterLockTracker};

use cfglock_common::{LockKind, Result};

/// Operations shared by the local and the cluster-aware configuration lock
pub trait ConfigurationLock: Send + Sync {
    fn lock(&self, kind: LockKind) -> Result<()>;

    fn try_lock(&self, kind: LockKind) -> Result<bool>;

    fn try_upgrade_lock(&self) -> Result<()>;

    fn unlock(&self) -> Result<()>;

    fn is_write_locked(&self) -> Result<bool>;

    fn is_enabled(&self) -> bool;

    /// Acquire `kind` and release it when the returned guard drops
    fn guard(&self, kind: LockKind) -> Result<ConfigLockGuard<'_, Self>>
    where
        Self: Sized,
    {
        ConfigLockGuard::acquire(self, kind)
    }
}

impl ConfigurationLock for LocalConfigurationLock {
    fn lock(&self, kind: LockKind) -> Result<()> {
        LocalConfigurationLock::lock(self, kind)
    }

    fn try_lock(&self, kind: LockKind) -> Result<bool> {
        LocalConfigurationLock::try_lock(self, kind)
    }

    fn try_upgrade_lock(&self) -> Result<()> {
        LocalConfigurationLock::try_upgrade_lock(self)
    }

    fn unlock(&self) -> Result<()> {
        LocalConfigurationLock::unlock(self)
    }

    fn is_write_locked(&self) -> Result<bool> {
        Ok(LocalConfigurationLock::is_write_locked(self))
    }

    fn is_enabled(&self) -> bool {
        LocalConfigurationLock::is_enabled(self)
    }
}
