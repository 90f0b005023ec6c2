//! Counting completion fence for asynchronous instantiation work.

use parking_lot::{Condvar, Mutex};

/// Monotonic counter with a wait primitive.
///
/// Each dispatched instantiation batch increments the count once on
/// completion, so waiting for `count >= n` means every batch dispatched
/// before reaching `n` has finished. Used for scheduler back-pressure and
/// for teardown ordering.
pub struct CompletionSignal {
    count: Mutex<u64>,
    cond: Condvar,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    /// Current completion count.
    pub fn count(&self) -> u64 {
        *self.count.lock()
    }

    /// Signal one completed batch.
    pub fn increment(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.cond.notify_all();
    }

    /// Block until the count reaches at least `target`.
    pub fn wait_until_at_least(&self, target: u64) {
        let mut count = self.count.lock();
        while *count < target {
            self.cond.wait(&mut count);
        }
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}
