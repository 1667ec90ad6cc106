//! cfglock Consistency - cluster-wide configuration write locking
//!
//! This crate provides:
//! - A process-local, thread-reentrant read/write configuration lock
//! - The external lock provider contract, with in-memory and file-backed providers
//! - A cluster-aware configuration lock keeping local and cluster state in step
//! - The configuration update sequence

pub mod lock;
pub mod sequence;

// Re-export lock types
pub use lock::{
    ClusterConfigurationLock, ClusterLockRegistry, ClusterLockTracker, ConfigLockGuard,
    ConfigurationLock, FileLockProvider, LocalConfigurationLock, LockHandle, LockHolder,
    LockProvider, LockSettings, MemoryLockProvider, ProviderKind,
};
pub use sequence::{DefaultUpdateSequence, SequenceSource, UpdateSequence};

pub use cfglock_common::{GLOBAL_LOCK_NAME, LockError, LockKind, Result};
