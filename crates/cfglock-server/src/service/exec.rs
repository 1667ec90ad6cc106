// Run a program while holding the configuration lock
// The lock is released after the program exits, whatever its status

use std::process::Command;

use anyhow::Context;
use tracing::{info, warn};

use cfglock_common::LockKind;
use cfglock_consistency::{ClusterConfigurationLock, ConfigLockGuard, ConfigurationLock, LockSettings};

/// Exit code when the lock is busy and `--try` was given
pub const EXIT_BUSY: i32 = 3;

/// Exit code for a program killed by a signal and for any cfglock error
/// other than a busy lock
pub const EXIT_FAILURE: i32 = 1;

/// Build the lock used by `exec`
///
/// With `try_only` the cluster lock is tried as well, since a fresh process
/// never contends on its own local lock.
pub fn exec_lock(
    settings: &LockSettings,
    try_only: bool,
) -> cfglock_common::Result<ClusterConfigurationLock> {
    if try_only && !settings.try_lock_non_blocking {
        let settings = LockSettings {
            try_lock_non_blocking: true,
            ..settings.clone()
        };
        return ClusterConfigurationLock::from_settings(&settings);
    }
    ClusterConfigurationLock::from_settings(settings)
}

/// Run `program` under `kind` and return its exit code
///
/// With `try_only`, returns [`EXIT_BUSY`] without running anything when the
/// lock cannot be taken.
pub fn run_locked(
    lock: &dyn ConfigurationLock,
    kind: LockKind,
    try_only: bool,
    program: &str,
    args: &[String],
) -> anyhow::Result<i32> {
    let guard = if try_only {
        match ConfigLockGuard::try_acquire(lock, kind)? {
            Some(guard) => guard,
            None => {
                warn!(%kind, "Configuration lock is busy");
                return Ok(EXIT_BUSY);
            }
        }
    } else {
        ConfigLockGuard::acquire(lock, kind)?
    };
    info!(%kind, program, "Configuration lock held, running program");

    let status = Command::new(program)
        .args(args)
        .status()
        .with_context(|| format!("failed to run '{}'", program))?;

    let code = status.code().unwrap_or(EXIT_FAILURE);
    match guard.release() {
        Ok(()) => info!(%kind, program, code, "Program finished, configuration lock released"),
        Err(e) => warn!(
            %kind,
            program,
            code,
            error = %e,
            "Program finished but the configuration lock release failed"
        ),
    }
    Ok(code)
}
