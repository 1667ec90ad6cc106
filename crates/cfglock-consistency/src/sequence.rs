//! Configuration update sequence
//!
//! Every configuration change bumps a monotonically increasing sequence number
//! stored on the global configuration record, so clients can tell whether
//! their view is stale.

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

const UNSET: i64 = i64::MIN;

/// Access to the update sequence stored on the global configuration record
pub trait SequenceSource: Send + Sync {
    /// Stored sequence value, or `None` when there is no global record yet
    fn update_sequence(&self) -> Option<i64>;

    fn set_update_sequence(&self, value: i64);
}

pub trait UpdateSequence: Send + Sync {
    /// Current sequence value, `0` without a global record
    fn curr_value(&self) -> i64;

    /// Advance the sequence and store the new value, `0` without a global record
    fn next_value(&self) -> i64;
}

/// Update sequence seeded once from the global record and advanced in memory
pub struct DefaultUpdateSequence<S: SequenceSource> {
    source: S,
    sequence: AtomicI64,
    lock: Mutex<()>,
}

impl<S: SequenceSource> DefaultUpdateSequence<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            sequence: AtomicI64::new(UNSET),
            lock: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    // Read the stored value, seeding the counter on first sight of a global record
    fn stored(&self) -> Option<i64> {
        let stored = self.source.update_sequence()?;
        let _ = self
            .sequence
            .compare_exchange(UNSET, stored, Ordering::AcqRel, Ordering::Acquire);
        Some(stored)
    }
}

impl<S: SequenceSource> UpdateSequence for DefaultUpdateSequence<S> {
    fn curr_value(&self) -> i64 {
        self.stored().unwrap_or(0)
    }

    fn next_value(&self) -> i64 {
        let _guard = self.lock.lock();
        if self.stored().is_none() {
            return 0;
        }
        let next = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        self.source.set_update_sequence(next);
        trace!(sequence = next, "Update sequence advanced");
        next
    }
}
