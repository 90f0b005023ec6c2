//! Producer-side queues drained by the scheduler.
//!
//! Usage marks go through an unbounded lock-free channel so the per-frame
//! hot path never contends with the registry lock. Cost reports go through
//! a small swap-buffer mutex held only for the push.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use super::record::{Cost, CostReport, ResourceId};

/// Multi-producer channel recording "mark used" events.
///
/// Producers publish with an atomic enqueue; only the scheduler drains.
pub struct UsageChannel {
    tx: Sender<ResourceId>,
    rx: Receiver<ResourceId>,
}

impl UsageChannel {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Record a use of `id`. Never blocks; callable from any thread.
    pub fn mark(&self, id: ResourceId) {
        // The receiver lives as long as the channel, so send cannot fail.
        let _ = self.tx.send(id);
    }

    /// Drain all pending marks into `f`. Single-consumer; called only by
    /// the scheduler under the registry lock.
    pub fn drain(&self, mut f: impl FnMut(ResourceId)) {
        for id in self.rx.try_iter() {
            f(id);
        }
    }
}

impl Default for UsageChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe buffer where completed instantiations report actual cost.
///
/// The scheduler swaps the pending vector out under the lock and applies
/// reports without holding it, so producers only ever contend on a push.
pub struct CostReportBuffer {
    pending: Mutex<Vec<CostReport>>,
}

impl CostReportBuffer {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Append one report. Held lock spans a single push.
    pub fn push(&self, id: ResourceId, cost: Cost) {
        self.pending.lock().push(CostReport { id, cost });
    }

    /// Swap the pending buffer into `scratch` (which is returned empty to
    /// the buffer for reuse).
    pub fn swap_into(&self, scratch: &mut Vec<CostReport>) {
        scratch.clear();
        std::mem::swap(&mut *self.pending.lock(), scratch);
    }
}

impl Default for CostReportBuffer {
    fn default() -> Self {
        Self::new()
    }
}
