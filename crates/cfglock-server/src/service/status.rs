// Probe whether the cluster lock is held, without waiting for it

use tracing::debug;

use cfglock_consistency::{FileLockProvider, LockHolder, LockProvider, LockSettings, ProviderKind};

/// Observed state of a cluster lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    Free,
    Held { holder: Option<LockHolder> },
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockStatus::Free => write!(f, "free"),
            LockStatus::Held { holder: Some(holder) } => write!(f, "held by {}", holder),
            LockStatus::Held { holder: None } => write!(f, "held"),
        }
    }
}

/// Check the named lock by briefly trying to take it
pub fn probe(provider: &dyn LockProvider, name: &str) -> anyhow::Result<LockStatus> {
    match provider.try_acquire(name)? {
        Some(handle) => {
            handle.release()?;
            debug!(name, provider = provider.provider_type(), "Lock is free");
            Ok(LockStatus::Free)
        }
        None => Ok(LockStatus::Held { holder: None }),
    }
}

/// Like [`probe`], reporting the holder recorded in the lock file
pub fn probe_file(provider: &FileLockProvider, name: &str) -> anyhow::Result<LockStatus> {
    match probe(provider, name)? {
        LockStatus::Free => Ok(LockStatus::Free),
        LockStatus::Held { .. } => Ok(LockStatus::Held {
            holder: provider.holder(name)?,
        }),
    }
}

/// Report the status of the lock described by `settings`
///
/// Memory provider locks exist only inside the process holding them, so
/// they cannot be observed from here.
pub fn lock_status(settings: &LockSettings) -> anyhow::Result<LockStatus> {
    match settings.provider {
        ProviderKind::File => probe_file(
            &FileLockProvider::new(settings.lock_dir.clone()),
            &settings.lock_name,
        ),
        ProviderKind::Memory => anyhow::bail!(
            "lock status is not available for the memory provider, its locks are local to the holding process"
        ),
    }
}
