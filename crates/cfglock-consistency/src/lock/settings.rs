//! Configuration lock settings

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cfglock_common::{DEFAULT_TRY_LOCK_TIMEOUT_MS, GLOBAL_LOCK_NAME, LockError, Result};

use super::provider::{FileLockProvider, LockProvider, MemoryLockProvider};

/// Which lock provider backs the cluster-wide lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Advisory file locks in a shared directory
    #[default]
    File,
    /// In-process locks, for single-node deployments and tests
    Memory,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::File => "file",
            ProviderKind::Memory => "memory",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(ProviderKind::File),
            "memory" => Ok(ProviderKind::Memory),
            _ => Err(format!("Invalid lock provider: {}", s)),
        }
    }
}

/// Settings for the cluster-aware configuration lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSettings {
    /// Whether configuration locking is active at all
    pub enabled: bool,
    /// Provider backing the cluster-wide lock
    pub provider: ProviderKind,
    /// Shared directory holding lock files (file provider only)
    pub lock_dir: PathBuf,
    /// Name of the cluster-wide lock
    pub lock_name: String,
    /// How long `try_lock` waits for the local lock
    pub try_lock_timeout: Duration,
    /// Make `try_lock(Write)` give up when the cluster lock is busy instead of waiting for it
    pub try_lock_non_blocking: bool,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: ProviderKind::File,
            lock_dir: PathBuf::from("data/locks"),
            lock_name: GLOBAL_LOCK_NAME.to_string(),
            try_lock_timeout: Duration::from_millis(DEFAULT_TRY_LOCK_TIMEOUT_MS),
            try_lock_non_blocking: false,
        }
    }
}

impl LockSettings {
    pub fn validate(&self) -> Result<()> {
        if self.lock_name.trim().is_empty() {
            return Err(LockError::Config("lock name must not be empty".to_string()));
        }
        if self
            .lock_name
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(LockError::Config(format!(
                "lock name '{}' contains invalid characters",
                self.lock_name
            )));
        }
        if self.provider == ProviderKind::File && self.lock_dir.as_os_str().is_empty() {
            return Err(LockError::Config(
                "lock directory is required for the file provider".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the provider described by these settings
    pub fn build_provider(&self) -> Arc<dyn LockProvider> {
        match self.provider {
            ProviderKind::File => Arc::new(FileLockProvider::new(self.lock_dir.clone())),
            ProviderKind::Memory => Arc::new(MemoryLockProvider::new()),
        }
    }
}
