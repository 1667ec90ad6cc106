//! Cluster-aware configuration lock
//!
//! Layers a cluster-wide exclusive lock, obtained from a `LockProvider`, over
//! the process-local `LocalConfigurationLock`. Only write locks touch the
//! provider; read locks stay local.
//!
//! Acquisition order is local first, then cluster. Release order is cluster
//! first, then local, and the local lock is released even when the cluster
//! release fails. `is_write_locked` cross-checks both halves: if they
//! disagree the thread's cluster lock is forcibly released and the call fails
//! with `LockError::StateConsistency`.

use std::sync::Arc;

use tracing::{debug, error, warn};

use cfglock_common::{GLOBAL_LOCK_NAME, LockError, LockKind, Result};

use super::local::LocalConfigurationLock;
use super::provider::LockProvider;
use super::settings::LockSettings;
use super::tracker::ClusterLockRegistry;
use super::ConfigurationLock;

/// Configuration lock with cluster-wide write exclusivity
#[derive(Debug)]
pub struct ClusterConfigurationLock {
    local: LocalConfigurationLock,
    provider: Arc<dyn LockProvider>,
    registry: ClusterLockRegistry,
    lock_name: String,
    try_lock_non_blocking: bool,
}

impl ClusterConfigurationLock {
    /// Create a lock over `provider` using the global lock name
    pub fn new(provider: Arc<dyn LockProvider>) -> Self {
        Self::with_local(LocalConfigurationLock::new(), provider)
    }

    pub fn with_local(local: LocalConfigurationLock, provider: Arc<dyn LockProvider>) -> Self {
        Self {
            local,
            provider,
            registry: ClusterLockRegistry::new(),
            lock_name: GLOBAL_LOCK_NAME.to_string(),
            try_lock_non_blocking: false,
        }
    }

    pub fn with_settings(settings: &LockSettings, provider: Arc<dyn LockProvider>) -> Result<Self> {
        settings.validate()?;
        let local = LocalConfigurationLock::with_timeout(settings.try_lock_timeout);
        local.set_enabled(settings.enabled);
        Ok(Self {
            local,
            provider,
            registry: ClusterLockRegistry::new(),
            lock_name: settings.lock_name.clone(),
            try_lock_non_blocking: settings.try_lock_non_blocking,
        })
    }

    /// Build the provider from `settings` and wrap it
    pub fn from_settings(settings: &LockSettings) -> Result<Self> {
        Self::with_settings(settings, settings.build_provider())
    }

    /// The process-local half of this lock
    pub fn local(&self) -> &LocalConfigurationLock {
        &self.local
    }

    pub fn provider(&self) -> &Arc<dyn LockProvider> {
        &self.provider
    }

    pub fn lock_name(&self) -> &str {
        &self.lock_name
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.local.set_enabled(enabled);
    }

    /// Nested cluster write holds of the current thread
    pub fn cluster_hold_count(&self) -> u32 {
        self.registry.hold_count()
    }

    /// Number of threads currently tracked as cluster lock holders
    pub fn tracked_threads(&self) -> usize {
        self.registry.len()
    }

    fn lock_cluster(&self) -> Result<()> {
        let result = self
            .registry
            .with_current(|tracker| tracker.lock(self.provider.as_ref(), &self.lock_name));

        match result {
            Ok(()) => {
                debug!(
                    lock = %self.lock_name,
                    provider = self.provider.provider_type(),
                    hold_count = self.registry.hold_count(),
                    "Cluster write lock held"
                );
                Ok(())
            }
            Err(e) => {
                self.release_local_after_failure();
                Err(e)
            }
        }
    }

    fn try_lock_cluster(&self) -> Result<bool> {
        let result = self
            .registry
            .with_current(|tracker| tracker.try_lock(self.provider.as_ref(), &self.lock_name));

        match result {
            Ok(true) => Ok(true),
            Ok(false) => {
                debug!(lock = %self.lock_name, "Cluster write lock busy");
                self.release_local_after_failure();
                Ok(false)
            }
            Err(e) => {
                self.release_local_after_failure();
                Err(e)
            }
        }
    }

    // Undo the local write acquisition that preceded a failed cluster acquisition
    fn release_local_after_failure(&self) {
        if let Err(e) = self.local.unlock() {
            warn!(error = %e, "Failed to release local write lock after cluster lock failure");
        }
    }

    fn unlock_cluster(&self) -> Result<()> {
        let released = self.registry.with_current(|tracker| tracker.unlock())?;
        if released {
            debug!(lock = %self.lock_name, "Cluster write lock released");
        }
        Ok(())
    }
}

impl ConfigurationLock for ClusterConfigurationLock {
    fn lock(&self, kind: LockKind) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        self.local.lock(kind)?;
        if kind.is_write() {
            self.lock_cluster()?;
        }
        Ok(())
    }

    /// Try the local lock; on success a write lock also takes the cluster lock
    ///
    /// Unless `try_lock_non_blocking` is set, the cluster acquisition after a
    /// successful local try still blocks until the provider grants it.
    fn try_lock(&self, kind: LockKind) -> Result<bool> {
        if !self.is_enabled() {
            return Ok(true);
        }

        if !self.local.try_lock(kind)? {
            return Ok(false);
        }
        if kind.is_write() {
            if self.try_lock_non_blocking {
                return self.try_lock_cluster();
            }
            self.lock_cluster()?;
        }
        Ok(true)
    }

    /// Upgrade the local read lock to a write lock
    ///
    /// The cluster lock is not taken: an upgraded write lock is local only,
    /// and `is_write_locked` reports it as a discrepancy.
    fn try_upgrade_lock(&self) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.local.try_upgrade_lock()
    }

    fn unlock(&self) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let cluster_result = if self.local.current_lock() == Some(LockKind::Write) {
            self.unlock_cluster()
        } else {
            Ok(())
        };
        let local_result = self.local.unlock();

        if let Err(e) = cluster_result {
            if let Err(local_err) = local_result {
                warn!(error = %local_err, "Local unlock failed after cluster release failure");
            }
            return Err(e);
        }
        local_result
    }

    fn is_write_locked(&self) -> Result<bool> {
        if !self.is_enabled() {
            return Ok(false);
        }

        let local_write_locked = self.local.is_write_locked();
        let cluster_write_locked = self.registry.is_write_locked();

        if local_write_locked != cluster_write_locked {
            let hold_count = self.registry.hold_count();
            error!(
                lock = %self.lock_name,
                hold_count,
                local_write_locked,
                "Local and cluster write lock status discrepancy, forcing cluster lock release"
            );

            if let Some(mut tracker) = self.registry.discard_current()
                && let Err(e) = tracker.force_unlock()
            {
                warn!(lock = %self.lock_name, error = %e, "Forced cluster lock release failed");
            }

            return Err(LockError::StateConsistency {
                hold_count,
                local_write_locked,
            });
        }

        Ok(local_write_locked || cluster_write_locked)
    }

    fn is_enabled(&self) -> bool {
        self.local.is_enabled()
    }
}
