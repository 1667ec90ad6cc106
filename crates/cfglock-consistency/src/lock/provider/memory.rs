// In-process lock provider
// Named exclusive locks kept in a DashMap, each slot a mutex/condvar pair

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::{LockHandle, LockProvider};

#[derive(Debug, Default)]
struct Slot {
    held: Mutex<bool>,
    released: Condvar,
}

impl Slot {
    fn unlock(&self) {
        *self.held.lock() = false;
        self.released.notify_one();
    }
}

/// Lock provider whose locks are visible to every holder of the same instance
///
/// Clones share the same lock table, so several cluster-aware locks built on
/// clones of one provider behave like nodes of one cluster.
#[derive(Debug, Default, Clone)]
pub struct MemoryLockProvider {
    slots: Arc<DashMap<String, Arc<Slot>>>,
}

impl MemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, name: &str) -> Arc<Slot> {
        self.slots.entry(name.to_string()).or_default().clone()
    }

    /// Whether the named lock is currently held by anyone
    pub fn is_held(&self, name: &str) -> bool {
        self.slots
            .get(name)
            .map(|slot| *slot.held.lock())
            .unwrap_or(false)
    }
}

impl LockProvider for MemoryLockProvider {
    fn provider_type(&self) -> &'static str {
        "memory"
    }

    fn acquire(&self, name: &str) -> anyhow::Result<Box<dyn LockHandle>> {
        let slot = self.slot(name);
        {
            let mut held = slot.held.lock();
            while *held {
                slot.released.wait(&mut held);
            }
            *held = true;
        }
        trace!(name = %name, "Memory lock acquired");
        Ok(Box::new(MemoryLockHandle::new(name, slot)))
    }

    fn try_acquire(&self, name: &str) -> anyhow::Result<Option<Box<dyn LockHandle>>> {
        let slot = self.slot(name);
        {
            let mut held = slot.held.lock();
            if *held {
                return Ok(None);
            }
            *held = true;
        }
        trace!(name = %name, "Memory lock acquired (try)");
        Ok(Some(Box::new(MemoryLockHandle::new(name, slot))))
    }
}

#[derive(Debug)]
struct MemoryLockHandle {
    name: String,
    slot: Arc<Slot>,
    released: bool,
}

impl MemoryLockHandle {
    fn new(name: &str, slot: Arc<Slot>) -> Self {
        Self {
            name: name.to_string(),
            slot,
            released: false,
        }
    }
}

impl LockHandle for MemoryLockHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(mut self: Box<Self>) -> anyhow::Result<()> {
        self.released = true;
        self.slot.unlock();
        trace!(name = %self.name, "Memory lock released");
        Ok(())
    }
}

impl Drop for MemoryLockHandle {
    fn drop(&mut self) {
        if !self.released {
            self.slot.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_acquire_release() {
        let provider = MemoryLockProvider::new();
        let handle = provider.acquire("cfg").unwrap();
        assert_eq!(handle.name(), "cfg");
        assert!(provider.is_held("cfg"));
        assert!(provider.try_acquire("cfg").unwrap().is_none());

        handle.release().unwrap();
        assert!(!provider.is_held("cfg"));
        let again = provider.try_acquire("cfg").unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn test_names_are_independent() {
        let provider = MemoryLockProvider::new();
        let _a = provider.acquire("a").unwrap();
        assert!(provider.try_acquire("b").unwrap().is_some());
    }

    #[test]
    fn test_clones_share_locks() {
        let node_a = MemoryLockProvider::new();
        let node_b = node_a.clone();
        let handle = node_a.acquire("cfg").unwrap();
        assert!(node_b.try_acquire("cfg").unwrap().is_none());
        handle.release().unwrap();
        assert!(node_b.try_acquire("cfg").unwrap().is_some());
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let provider = MemoryLockProvider::new();
        let handle = provider.acquire("cfg").unwrap();

        let other = provider.clone();
        let waiter = thread::spawn(move || {
            let handle = other.acquire("cfg").unwrap();
            handle.release().unwrap();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());
        handle.release().unwrap();
        waiter.join().unwrap();
        assert!(!provider.is_held("cfg"));
    }

    #[test]
    fn test_dropped_handle_releases() {
        let provider = MemoryLockProvider::new();
        drop(provider.acquire("cfg").unwrap());
        assert!(!provider.is_held("cfg"));
    }
}
