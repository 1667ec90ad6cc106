//! External Lock Provider contract
//!
//! The cluster-wide half of the configuration lock is delegated to a provider
//! offering named, exclusive, blocking locks. Implementations:
//! - `MemoryLockProvider`: named locks shared within one process
//! - `FileLockProvider`: OS advisory locks on files in a shared directory

mod file;
mod memory;

pub use file::{FileLockProvider, LockHolder};
pub use memory::MemoryLockProvider;

use std::fmt::Debug;

/// Provider of named, cluster-wide exclusive locks
pub trait LockProvider: Send + Sync + Debug {
    /// Short label used in logs (e.g. `"file"`, `"memory"`)
    fn provider_type(&self) -> &'static str;

    /// Acquire the named lock, blocking until it is granted
    fn acquire(&self, name: &str) -> anyhow::Result<Box<dyn LockHandle>>;

    /// Acquire the named lock only if it is free right now
    fn try_acquire(&self, name: &str) -> anyhow::Result<Option<Box<dyn LockHandle>>>;
}

/// A held provider lock
///
/// Releasing consumes the handle, so each acquisition is released at most once.
pub trait LockHandle: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn release(self: Box<Self>) -> anyhow::Result<()>;
}
