//! Local Reentrant Configuration Lock
//!
//! Process-local read/write lock with per-thread reentrancy:
//! - One writer thread at a time, with a reentrant hold count
//! - Any number of reader threads, each with its own hold count
//! - The writer thread may also take nested read locks
//! - Waiting writers block new readers from other threads
//!
//! Every thread keeps a LIFO stack of the lock kinds it acquired, so
//! `unlock()` always releases the most recent acquisition.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use cfglock_common::{DEFAULT_TRY_LOCK_TIMEOUT_MS, LockError, LockKind, Result};

#[derive(Debug, Default)]
struct LockState {
    writer: Option<ThreadId>,
    write_holds: u32,
    readers: HashMap<ThreadId, u32>,
    waiting_writers: usize,
    held: HashMap<ThreadId, Vec<LockKind>>,
}

impl LockState {
    fn can_read(&self, thread: ThreadId) -> bool {
        match self.writer {
            Some(writer) => writer == thread,
            // Reentrant readers never queue behind writers, or they would wait on themselves
            None => self.readers.contains_key(&thread) || self.waiting_writers == 0,
        }
    }

    fn can_write(&self, thread: ThreadId) -> bool {
        match self.writer {
            Some(writer) => writer == thread,
            None => self.readers.is_empty(),
        }
    }

    fn holds_read_only(&self, thread: ThreadId) -> bool {
        self.writer != Some(thread) && self.readers.contains_key(&thread)
    }

    fn grant(&mut self, thread: ThreadId, kind: LockKind) {
        match kind {
            LockKind::Read => *self.readers.entry(thread).or_insert(0) += 1,
            LockKind::Write => {
                self.writer = Some(thread);
                self.write_holds += 1;
            }
        }
        self.held.entry(thread).or_default().push(kind);
    }

    fn release(&mut self, thread: ThreadId) -> Option<LockKind> {
        let stack = self.held.get_mut(&thread)?;
        let kind = stack.pop()?;
        if stack.is_empty() {
            self.held.remove(&thread);
        }

        match kind {
            LockKind::Read => {
                if let Some(count) = self.readers.get_mut(&thread) {
                    *count -= 1;
                    if *count == 0 {
                        self.readers.remove(&thread);
                    }
                }
            }
            LockKind::Write => {
                self.write_holds = self.write_holds.saturating_sub(1);
                if self.write_holds == 0 {
                    self.writer = None;
                }
            }
        }
        Some(kind)
    }
}

/// Process-local configuration lock
///
/// When disabled, every operation succeeds trivially and nothing is tracked.
#[derive(Debug)]
pub struct LocalConfigurationLock {
    state: Mutex<LockState>,
    changed: Condvar,
    enabled: AtomicBool,
    try_lock_timeout: Duration,
}

impl Default for LocalConfigurationLock {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalConfigurationLock {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_millis(DEFAULT_TRY_LOCK_TIMEOUT_MS))
    }

    /// Create a lock whose `try_lock` waits at most `try_lock_timeout`
    ///
    /// A zero timeout makes `try_lock` return immediately.
    pub fn with_timeout(try_lock_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            changed: Condvar::new(),
            enabled: AtomicBool::new(true),
            try_lock_timeout,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn try_lock_timeout(&self) -> Duration {
        self.try_lock_timeout
    }

    /// Acquire a lock of the given kind, blocking until it is available
    pub fn lock(&self, kind: LockKind) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let thread = thread::current().id();
        let mut state = self.state.lock();

        match kind {
            LockKind::Read => {
                while !state.can_read(thread) {
                    self.changed.wait(&mut state);
                }
            }
            LockKind::Write => {
                if state.holds_read_only(thread) {
                    return Err(LockError::WriteWhileReading);
                }
                state.waiting_writers += 1;
                while !state.can_write(thread) {
                    self.changed.wait(&mut state);
                }
                state.waiting_writers -= 1;
            }
        }

        state.grant(thread, kind);
        trace!(?thread, %kind, "Local configuration lock acquired");
        Ok(())
    }

    /// Try to acquire a lock of the given kind within the configured timeout
    pub fn try_lock(&self, kind: LockKind) -> Result<bool> {
        if !self.is_enabled() {
            return Ok(true);
        }
        Ok(self.try_lock_within(kind, self.try_lock_timeout))
    }

    fn try_lock_within(&self, kind: LockKind, timeout: Duration) -> bool {
        let thread = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        let acquired = match kind {
            LockKind::Read => loop {
                if state.can_read(thread) {
                    break true;
                }
                if self.changed.wait_until(&mut state, deadline).timed_out() {
                    break state.can_read(thread);
                }
            },
            LockKind::Write => {
                if state.holds_read_only(thread) {
                    false
                } else {
                    state.waiting_writers += 1;
                    let acquired = loop {
                        if state.can_write(thread) {
                            break true;
                        }
                        if self.changed.wait_until(&mut state, deadline).timed_out() {
                            break state.can_write(thread);
                        }
                    };
                    state.waiting_writers -= 1;
                    if !acquired {
                        // Readers held back by this attempt may proceed now
                        self.changed.notify_all();
                    }
                    acquired
                }
            }
        };

        if acquired {
            state.grant(thread, kind);
            trace!(?thread, %kind, "Local configuration lock acquired (try)");
        } else {
            debug!(?thread, %kind, ?timeout, "Local configuration lock not available");
        }
        acquired
    }

    /// Trade the read lock held by the current thread for a write lock
    ///
    /// The read lock is released first, so other writers may get in between.
    /// On failure the thread holds neither lock for this acquisition.
    pub fn try_upgrade_lock(&self) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let thread = thread::current().id();
        {
            let mut state = self.state.lock();
            match state.held.get(&thread).and_then(|stack| stack.last()) {
                None => return Err(LockError::NoLockHeld),
                Some(LockKind::Write) => return Err(LockError::AlreadyWriteLocked),
                Some(LockKind::Read) if state.writer == Some(thread) => {
                    return Err(LockError::AlreadyWriteLocked);
                }
                Some(LockKind::Read) => {}
            }
            state.release(thread);
            self.changed.notify_all();
        }

        if self.try_lock_within(LockKind::Write, self.try_lock_timeout) {
            debug!(?thread, "Local configuration lock upgraded to write");
            Ok(())
        } else {
            Err(LockError::UpgradeFailed)
        }
    }

    /// Release the most recent acquisition made by the current thread
    pub fn unlock(&self) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let thread = thread::current().id();
        let mut state = self.state.lock();
        match state.release(thread) {
            Some(kind) => {
                trace!(?thread, %kind, "Local configuration lock released");
                self.changed.notify_all();
            }
            None => debug!(?thread, "unlock() called without a held configuration lock"),
        }
        Ok(())
    }

    /// Whether the current thread holds the write lock
    pub fn is_write_locked(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.state.lock().writer == Some(thread::current().id())
    }

    /// Kind of lock the next `unlock()` on the current thread releases
    pub fn current_lock(&self) -> Option<LockKind> {
        let thread = thread::current().id();
        self.state
            .lock()
            .held
            .get(&thread)
            .and_then(|stack| stack.last().copied())
    }

    pub fn read_hold_count(&self) -> u32 {
        let thread = thread::current().id();
        self.state
            .lock()
            .readers
            .get(&thread)
            .copied()
            .unwrap_or(0)
    }

    pub fn write_hold_count(&self) -> u32 {
        let state = self.state.lock();
        if state.writer == Some(thread::current().id()) {
            state.write_holds
        } else {
            0
        }
    }

    /// Whether any thread holds the write lock
    pub fn is_write_locked_by_any(&self) -> bool {
        self.state.lock().writer.is_some()
    }
}
