//! Lock-backed commands of the cfglock binary

mod exec;
mod status;

pub use exec::{EXIT_BUSY, EXIT_FAILURE, exec_lock, run_locked};
pub use status::{LockStatus, lock_status, probe, probe_file};
