// Integration tests for ClusterConfigurationLock
// Covers hold-count round trips, divergence recovery, provider failures, disabled mode
// and many threads sharing one lock

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use cfglock_consistency::{
    ClusterConfigurationLock, ConfigurationLock, FileLockProvider, GLOBAL_LOCK_NAME,
    LocalConfigurationLock, LockError, LockHandle, LockKind, LockProvider, LockSettings,
    MemoryLockProvider, ProviderKind,
};
use proptest::prelude::*;

/// Provider wrapper counting calls and injecting failures
#[derive(Debug, Default)]
struct RecordingProvider {
    inner: MemoryLockProvider,
    acquires: AtomicUsize,
    releases: Arc<AtomicUsize>,
    fail_acquire: AtomicBool,
    fail_release: Arc<AtomicBool>,
}

impl RecordingProvider {
    fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn is_held(&self) -> bool {
        self.inner.is_held(GLOBAL_LOCK_NAME)
    }
}

#[derive(Debug)]
struct RecordingHandle {
    inner: Box<dyn LockHandle>,
    releases: Arc<AtomicUsize>,
    fail_release: Arc<AtomicBool>,
}

impl LockHandle for RecordingHandle {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn release(self: Box<Self>) -> anyhow::Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail_release.load(Ordering::SeqCst);
        self.inner.release()?;
        if fail {
            anyhow::bail!("provider connection lost");
        }
        Ok(())
    }
}

impl LockProvider for RecordingProvider {
    fn provider_type(&self) -> &'static str {
        "recording"
    }

    fn acquire(&self, name: &str) -> anyhow::Result<Box<dyn LockHandle>> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        if self.fail_acquire.load(Ordering::SeqCst) {
            anyhow::bail!("provider unavailable");
        }
        Ok(Box::new(RecordingHandle {
            inner: self.inner.acquire(name)?,
            releases: self.releases.clone(),
            fail_release: self.fail_release.clone(),
        }))
    }

    fn try_acquire(&self, name: &str) -> anyhow::Result<Option<Box<dyn LockHandle>>> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.try_acquire(name)?.map(|inner| {
            Box::new(RecordingHandle {
                inner,
                releases: self.releases.clone(),
                fail_release: self.fail_release.clone(),
            }) as Box<dyn LockHandle>
        }))
    }
}

fn recording_lock() -> (Arc<ClusterConfigurationLock>, Arc<RecordingProvider>) {
    let provider = Arc::new(RecordingProvider::default());
    let lock = ClusterConfigurationLock::with_local(
        LocalConfigurationLock::with_timeout(Duration::ZERO),
        provider.clone(),
    );
    (Arc::new(lock), provider)
}

#[test]
fn test_nested_write_lifecycle() {
    let (lock, provider) = recording_lock();

    lock.lock(LockKind::Write).unwrap();
    assert_eq!(provider.acquires(), 1);
    assert_eq!(lock.cluster_hold_count(), 1);

    lock.lock(LockKind::Write).unwrap();
    assert_eq!(provider.acquires(), 1);
    assert_eq!(lock.cluster_hold_count(), 2);

    lock.unlock().unwrap();
    assert_eq!(lock.cluster_hold_count(), 1);
    assert_eq!(provider.releases(), 0);
    assert!(lock.is_write_locked().unwrap());

    lock.unlock().unwrap();
    assert_eq!(lock.cluster_hold_count(), 0);
    assert_eq!(provider.releases(), 1);
    assert_eq!(lock.tracked_threads(), 0);

    assert!(!lock.is_write_locked().unwrap());
}

#[test]
fn test_try_lock_rejected_without_provider_call() {
    let (lock, provider) = recording_lock();
    lock.lock(LockKind::Write).unwrap();

    let other = lock.clone();
    let acquired = thread::spawn(move || other.try_lock(LockKind::Write).unwrap())
        .join()
        .unwrap();

    assert!(!acquired);
    assert_eq!(provider.acquires(), 1);
    assert_eq!(lock.cluster_hold_count(), 1);
    assert!(lock.is_write_locked().unwrap());

    lock.unlock().unwrap();
    assert!(!provider.is_held());
}

#[test]
fn test_try_lock_success_takes_cluster_lock() {
    let (lock, provider) = recording_lock();
    assert!(lock.try_lock(LockKind::Write).unwrap());
    assert_eq!(provider.acquires(), 1);
    assert!(provider.is_held());
    lock.unlock().unwrap();

    assert!(lock.try_lock(LockKind::Read).unwrap());
    assert_eq!(provider.acquires(), 1);
    lock.unlock().unwrap();
}

#[test]
fn test_acquire_failure_releases_local_lock() {
    let (lock, provider) = recording_lock();
    provider.fail_acquire.store(true, Ordering::SeqCst);

    let err = lock.lock(LockKind::Write).unwrap_err();
    assert!(matches!(err, LockError::ProviderAcquire { .. }));
    assert!(!lock.local().is_write_locked());
    assert_eq!(lock.tracked_threads(), 0);
    assert!(!lock.is_write_locked().unwrap());

    let err = lock.try_lock(LockKind::Write).unwrap_err();
    assert!(err.is_provider_failure());
    assert!(!lock.local().is_write_locked());

    provider.fail_acquire.store(false, Ordering::SeqCst);
    lock.lock(LockKind::Write).unwrap();
    lock.unlock().unwrap();
}

#[test]
fn test_release_failure_still_frees_local_lock() {
    let (lock, provider) = recording_lock();
    lock.lock(LockKind::Write).unwrap();
    provider.fail_release.store(true, Ordering::SeqCst);

    let err = lock.unlock().unwrap_err();
    assert!(matches!(err, LockError::ProviderRelease { .. }));
    assert!(!lock.local().is_write_locked());
    assert_eq!(lock.tracked_threads(), 0);

    // Another thread can now take the local lock
    let other = lock.clone();
    let acquired = thread::spawn(move || {
        let acquired = other.local().try_lock(LockKind::Write).unwrap();
        other.local().unlock().unwrap();
        acquired
    })
    .join()
    .unwrap();
    assert!(acquired);
}

#[test]
fn test_divergence_is_reported_and_reset() {
    let (lock, provider) = recording_lock();

    // Local write lock taken behind the cluster lock's back
    lock.local().lock(LockKind::Write).unwrap();
    let err = lock.is_write_locked().unwrap_err();
    assert!(err.is_consistency_violation());
    assert!(err.to_string().contains("locally locked: true"));
    assert_eq!(provider.acquires(), 0);
    lock.local().unlock().unwrap();

    // Cluster hold left behind after the local lock was dropped
    lock.lock(LockKind::Write).unwrap();
    lock.local().unlock().unwrap();
    let err = lock.is_write_locked().unwrap_err();
    assert!(matches!(
        err,
        LockError::StateConsistency {
            hold_count: 1,
            local_write_locked: false
        }
    ));
    assert_eq!(provider.releases(), 1);
    assert!(!provider.is_held());
    assert_eq!(lock.tracked_threads(), 0);

    // The next call starts clean
    assert!(!lock.is_write_locked().unwrap());
    lock.lock(LockKind::Write).unwrap();
    assert!(lock.is_write_locked().unwrap());
    lock.unlock().unwrap();
}

#[test]
fn test_disabled_never_calls_provider() {
    let (lock, provider) = recording_lock();
    lock.set_enabled(false);

    lock.lock(LockKind::Write).unwrap();
    lock.lock(LockKind::Read).unwrap();
    assert!(lock.try_lock(LockKind::Write).unwrap());
    lock.try_upgrade_lock().unwrap();
    assert!(!lock.is_write_locked().unwrap());
    lock.unlock().unwrap();
    lock.unlock().unwrap();
    lock.unlock().unwrap();

    assert_eq!(provider.acquires(), 0);
    assert_eq!(provider.releases(), 0);
    assert_eq!(lock.tracked_threads(), 0);
}

#[test]
fn test_two_nodes_exclude_each_other() {
    let provider = MemoryLockProvider::new();
    let node_a = Arc::new(ClusterConfigurationLock::new(Arc::new(provider.clone())));
    let node_b = Arc::new(ClusterConfigurationLock::new(Arc::new(provider.clone())));

    node_a.lock(LockKind::Write).unwrap();

    let (tx, rx) = mpsc::channel();
    let b = node_b.clone();
    let writer = thread::spawn(move || {
        b.lock(LockKind::Write).unwrap();
        tx.send(()).unwrap();
        b.unlock().unwrap();
    });

    // Node B holds its local lock but waits on the cluster lock
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    node_a.unlock().unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    writer.join().unwrap();
    assert!(!provider.is_held(GLOBAL_LOCK_NAME));
}

#[test]
fn test_non_blocking_try_lock_when_cluster_busy() {
    let provider = MemoryLockProvider::new();
    let settings = LockSettings {
        provider: ProviderKind::Memory,
        try_lock_timeout: Duration::ZERO,
        try_lock_non_blocking: true,
        ..Default::default()
    };
    let node_a = ClusterConfigurationLock::with_settings(&settings, Arc::new(provider.clone()))
        .unwrap();
    let node_b = Arc::new(
        ClusterConfigurationLock::with_settings(&settings, Arc::new(provider.clone())).unwrap(),
    );

    node_a.lock(LockKind::Write).unwrap();

    let b = node_b.clone();
    let (acquired, local_held) = thread::spawn(move || {
        let acquired = b.try_lock(LockKind::Write).unwrap();
        (acquired, b.local().is_write_locked())
    })
    .join()
    .unwrap();
    assert!(!acquired);
    assert!(!local_held);
    assert_eq!(node_b.tracked_threads(), 0);

    node_a.unlock().unwrap();
    assert!(node_b.try_lock(LockKind::Write).unwrap());
    node_b.unlock().unwrap();
}

#[test]
fn test_file_provider_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let node_a = ClusterConfigurationLock::new(Arc::new(FileLockProvider::new(dir.path())));
    let probe = FileLockProvider::new(dir.path());

    node_a.lock(LockKind::Write).unwrap();
    assert!(probe.try_acquire(GLOBAL_LOCK_NAME).unwrap().is_none());
    let holder = probe.holder(GLOBAL_LOCK_NAME).unwrap().unwrap();
    assert_eq!(holder.pid, std::process::id());

    node_a.unlock().unwrap();
    assert!(probe.try_acquire(GLOBAL_LOCK_NAME).unwrap().is_some());
}

#[test]
fn test_guard_unlocks_cluster_lock() {
    let (lock, provider) = recording_lock();
    {
        let _guard = lock.guard(LockKind::Write).unwrap();
        assert!(provider.is_held());
    }
    assert!(!provider.is_held());
    assert_eq!(provider.releases(), 1);
}

#[test]
fn test_many_threads_share_one_lock() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 200;

    let provider = MemoryLockProvider::new();
    let lock = Arc::new(ClusterConfigurationLock::new(Arc::new(provider.clone())));
    let writers_inside = Arc::new(AtomicUsize::new(0));
    let write_sections = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let lock = lock.clone();
            let writers_inside = writers_inside.clone();
            let write_sections = write_sections.clone();
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    lock.lock(LockKind::Write).unwrap();
                    assert_eq!(writers_inside.fetch_add(1, Ordering::SeqCst), 0);
                    assert!(lock.is_write_locked().unwrap());

                    lock.lock(LockKind::Write).unwrap();
                    lock.lock(LockKind::Read).unwrap();
                    assert_eq!(lock.cluster_hold_count(), 2);
                    lock.unlock().unwrap();
                    lock.unlock().unwrap();
                    assert_eq!(lock.cluster_hold_count(), 1);
                    assert!(lock.is_write_locked().unwrap());

                    write_sections.fetch_add(1, Ordering::SeqCst);
                    writers_inside.fetch_sub(1, Ordering::SeqCst);
                    lock.unlock().unwrap();
                    assert!(!lock.is_write_locked().unwrap());

                    if round % 2 == 0 {
                        lock.lock(LockKind::Read).unwrap();
                        assert!(!lock.is_write_locked().unwrap());
                        assert_eq!(lock.cluster_hold_count(), 0);
                        lock.unlock().unwrap();
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(write_sections.load(Ordering::SeqCst), THREADS * ROUNDS);
    assert_eq!(writers_inside.load(Ordering::SeqCst), 0);
    assert_eq!(lock.tracked_threads(), 0);
    assert!(!provider.is_held(GLOBAL_LOCK_NAME));
    assert!(!lock.is_write_locked().unwrap());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // true = lock(Write), false = unlock(); unlocks without a hold are skipped
    #[test]
    fn prop_one_acquire_per_nested_run(ops in proptest::collection::vec(any::<bool>(), 1..40)) {
        let (lock, provider) = recording_lock();
        let mut depth = 0u32;
        let mut runs = 0usize;

        for op in ops {
            if op {
                if depth == 0 {
                    runs += 1;
                }
                lock.lock(LockKind::Write).unwrap();
                depth += 1;
            } else if depth > 0 {
                lock.unlock().unwrap();
                depth -= 1;
            }
            prop_assert_eq!(lock.cluster_hold_count(), depth);
            prop_assert_eq!(lock.is_write_locked().unwrap(), depth > 0);
        }

        let completed = if depth > 0 { runs - 1 } else { runs };
        prop_assert_eq!(provider.acquires(), runs);
        prop_assert_eq!(provider.releases(), completed);

        while depth > 0 {
            lock.unlock().unwrap();
            depth -= 1;
        }
        prop_assert_eq!(provider.releases(), runs);
        prop_assert!(!provider.is_held());
    }
}
