//! cfglock Common - Shared types, constants, and errors
//!
//! This crate provides the foundational types used across all cfglock components:
//! - Lock kinds
//! - Error types for the configuration lock
//! - Well-known lock names and property keys

pub mod error;

// Re-exports for convenience
pub use error::{LockError, Result};

use serde::{Deserialize, Serialize};

/// Name of the single cluster-wide lock guarding the shared configuration store.
///
/// Every process in the cluster acquires the external lock under this name.
pub const GLOBAL_LOCK_NAME: &str = "global_datadir_lock";

/// Default time `try_lock` waits for the local lock, in milliseconds.
pub const DEFAULT_TRY_LOCK_TIMEOUT_MS: u64 = 30_000;

/// Property keys understood by the configuration loader
pub const LOCK_ENABLED_PROPERTY: &str = "lock.enabled";
pub const LOCK_PROVIDER_PROPERTY: &str = "lock.provider";
pub const LOCK_DIR_PROPERTY: &str = "lock.dir";
pub const LOCK_NAME_PROPERTY: &str = "lock.name";
pub const TRY_LOCK_TIMEOUT_PROPERTY: &str = "lock.try_timeout_ms";
pub const TRY_LOCK_NON_BLOCKING_PROPERTY: &str = "lock.try_non_blocking";
pub const LOG_DIR_PROPERTY: &str = "logs.dir";
pub const LOG_LEVEL_PROPERTY: &str = "logs.level";
pub const LOG_FILE_PROPERTY: &str = "logs.file";
pub const LOG_CONSOLE_PROPERTY: &str = "logs.console";

/// Kind of configuration lock
///
/// Only `Write` locks are coordinated across the cluster; `Read` locks are
/// purely local to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockKind {
    #[default]
    Read,
    Write,
}

impl LockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LockKind::Read => "read",
            LockKind::Write => "write",
        }
    }

    pub fn is_write(self) -> bool {
        self == LockKind::Write
    }
}

impl std::fmt::Display for LockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LockKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(LockKind::Read),
            "write" => Ok(LockKind::Write),
            _ => Err(format!("Invalid lock kind: {}", s)),
        }
    }
}
