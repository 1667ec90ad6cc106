//! Error types for the configuration lock
//!
//! This module defines `LockError`, covering:
//! - External lock provider failures on acquire and release
//! - Local/cluster state divergence
//! - Misuse of the local reentrant lock

/// Configuration lock error types
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    #[error("failed to acquire cluster lock '{name}': {source}")]
    ProviderAcquire {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to release cluster lock '{name}': {source}")]
    ProviderRelease {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "local and cluster write lock status discrepancy: cluster hold count: {hold_count}, locally locked: {local_write_locked}. The cluster lock was forcibly released"
    )]
    StateConsistency {
        hold_count: u32,
        local_write_locked: bool,
    },

    #[error("no configuration lock currently held")]
    NoLockHeld,

    #[error("already owning a write lock")]
    AlreadyWriteLocked,

    #[error(
        "failed to upgrade lock from read to write state, please retry the configuration operation"
    )]
    UpgradeFailed,

    #[error("cannot block on a write lock while holding a read lock, use try_upgrade_lock")]
    WriteWhileReading,

    #[error("configuration error: {0}")]
    Config(String),
}

impl LockError {
    /// Whether this error reports local/cluster divergence
    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, LockError::StateConsistency { .. })
    }

    /// Whether this error originated in the external lock provider
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            LockError::ProviderAcquire { .. } | LockError::ProviderRelease { .. }
        )
    }
}

/// Result type alias for configuration lock operations
pub type Result<T> = std::result::Result<T, LockError>;
