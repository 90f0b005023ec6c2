//! Registry state: the append-only record bank and its scratch buffers.
//!
//! Everything in here is owned exclusively by the manager and mutated only
//! under its registry lock. Records are addressed by their dense id; no
//! record is ever removed, only its residency toggled.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::Arc;

use super::instantiator::Instantiator;
use super::record::{Cost, CostReport, ResourceClass, ResourceId, ResourceRecord};
use super::source::SourceHandle;

/// Hash a content path for deduplication.
pub(crate) fn path_hash(path: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(path.as_bytes());
    hasher.finish()
}

pub(crate) struct RecordBank {
    records: Vec<ResourceRecord>,
    by_path: HashMap<u64, ResourceId>,
    /// Reorder buffer rebuilt every cycle: record indices, best-to-keep
    /// first, best-to-evict last.
    pub(crate) scratch: Vec<usize>,
    pub(crate) report_scratch: Vec<CostReport>,
    /// Running sum of `consumed + pending` across all records. Maintained
    /// incrementally via deltas, never by rescans.
    pub(crate) total_consumed: Cost,
    /// Logical clock, advanced once per completed cycle.
    pub(crate) timestamp: u64,
    /// Timestamp advances owed by blocking single-resource dispatches,
    /// applied at the start of the next full cycle.
    pub(crate) deferred_advances: u64,
    pub(crate) budget: Cost,
    pub(crate) budget_per_cycle: Cost,
    pub(crate) iface: Option<Arc<dyn Instantiator>>,
}

impl RecordBank {
    pub(crate) fn new(budget: Cost, budget_per_cycle: Cost) -> Self {
        Self {
            records: Vec::new(),
            by_path: HashMap::new(),
            scratch: Vec::new(),
            report_scratch: Vec::new(),
            total_consumed: 0,
            timestamp: 0,
            deferred_advances: 0,
            budget,
            budget_per_cycle,
            iface: None,
        }
    }

    pub(crate) fn len(&self) -> u32 {
        self.records.len() as u32
    }

    pub(crate) fn get(&self, id: ResourceId) -> Option<&ResourceRecord> {
        self.records.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: ResourceId) -> Option<&mut ResourceRecord> {
        self.records.get_mut(id.index())
    }

    pub(crate) fn record(&self, index: usize) -> &ResourceRecord {
        &self.records[index]
    }

    pub(crate) fn record_mut(&mut self, index: usize) -> &mut ResourceRecord {
        &mut self.records[index]
    }

    #[cfg(test)]
    pub(crate) fn records_mut(&mut self) -> impl Iterator<Item = &mut ResourceRecord> {
        self.records.iter_mut()
    }

    /// Append a new record, assign the next id, and notify an attached
    /// instantiator of the new bound and class.
    pub(crate) fn register(
        &mut self,
        handle: Arc<SourceHandle>,
        class: ResourceClass,
        priority: i32,
    ) -> ResourceId {
        let id = ResourceId(self.records.len() as u32);
        self.records.push(ResourceRecord::new(id, handle, class, priority));
        self.scratch.reserve(self.records.len());
        if let Some(iface) = &self.iface {
            iface.set_id_bounds(self.records.len() as u32);
            iface.set_class(id, class);
        }
        id
    }

    pub(crate) fn find_by_path(&self, hash: u64) -> Option<ResourceId> {
        self.by_path.get(&hash).copied()
    }

    pub(crate) fn bind_path(&mut self, hash: u64, id: ResourceId) {
        self.records[id.index()].path_hash = Some(hash);
        self.by_path.insert(hash, id);
    }

    /// Apply one confirmed cost report as a signed delta against
    /// `total_consumed`.
    pub(crate) fn apply_report(&mut self, report: CostReport) {
        let timestamp = self.timestamp;
        if let Some(record) = self.records.get_mut(report.id.index()) {
            self.total_consumed -= record.consumed + record.pending;
            self.total_consumed += report.cost;
            record.consumed = report.cost;
            record.pending = 0;
            // A just-paged-in resource must not be immediately evictable
            // when we're thrashing near the budget.
            record.last_used = timestamp;
        }
    }

    /// Mark a reported usage at the current timestamp.
    pub(crate) fn touch(&mut self, id: ResourceId) {
        let timestamp = self.timestamp;
        if let Some(record) = self.records.get_mut(id.index()) {
            record.last_used = timestamp;
        }
    }

    /// Rebuild the scratch sequence: most-worth-keeping first, best
    /// eviction candidate last.
    pub(crate) fn reorder(&mut self) {
        self.scratch.clear();
        self.scratch.extend(0..self.records.len());
        let records = &self.records;
        self.scratch.sort_unstable_by(|&a, &b| {
            let (ra, rb) = (&records[a], &records[b]);
            rb.priority
                .cmp(&ra.priority)
                .then_with(|| rb.last_used.cmp(&ra.last_used))
                .then_with(|| ra.consumed.cmp(&rb.consumed))
                .then_with(|| rb.pending.cmp(&ra.pending))
                .then_with(|| ra.id.0.cmp(&rb.id.0))
        });
    }

    /// Total batches dispatched so far; the completion signal reaches this
    /// count once every dispatched instantiation has finished.
    pub(crate) fn dispatch_target(&self) -> u64 {
        self.timestamp + self.deferred_advances
    }

    /// Zero all residency bookkeeping. Used when swapping instantiators.
    pub(crate) fn reset_residency(&mut self) {
        for record in &mut self.records {
            record.consumed = 0;
            record.pending = 0;
            record.last_used = 0;
        }
        self.total_consumed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> Arc<SourceHandle> {
        Arc::new(SourceHandle::from_bytes("mem://r", vec![0u8; 16]))
    }

    fn bank_with(priorities: &[i32]) -> RecordBank {
        let mut bank = RecordBank::new(1000, 1000);
        for &priority in priorities {
            bank.register(handle(), ResourceClass::Color, priority);
        }
        bank
    }

    #[test]
    fn ids_are_dense_and_monotonic() {
        let mut bank = RecordBank::new(0, 0);
        for expected in 0..4 {
            let id = bank.register(handle(), ResourceClass::Color, 1);
            assert_eq!(id.0, expected);
        }
        assert_eq!(bank.len(), 4);
    }

    #[test]
    fn reorder_sorts_priority_then_recency() {
        let mut bank = bank_with(&[1, 5, 5]);
        bank.timestamp = 7;
        bank.touch(ResourceId(2));
        bank.reorder();
        // Highest priority first; among equals, most recently used first.
        assert_eq!(bank.scratch, vec![2, 1, 0]);
    }

    #[test]
    fn reorder_prefers_evicting_cheap_residents() {
        let mut bank = bank_with(&[1, 1, 1]);
        bank.apply_report(CostReport { id: ResourceId(0), cost: 50 });
        bank.apply_report(CostReport { id: ResourceId(2), cost: 10 });
        bank.record_mut(1).pending = 30;
        // Zero out recency so consumed/pending tie-breaks decide.
        for record in bank.records_mut() {
            record.last_used = 0;
        }
        bank.reorder();
        // Pending-protected first, then cheap, then expensive last (the
        // eviction candidate end).
        assert_eq!(bank.scratch, vec![1, 2, 0]);
    }

    #[test]
    fn apply_report_updates_total_by_delta() {
        let mut bank = bank_with(&[1]);
        bank.record_mut(0).pending = 40;
        bank.total_consumed = 40;

        bank.apply_report(CostReport { id: ResourceId(0), cost: 25 });
        assert_eq!(bank.total_consumed, 25);
        assert_eq!(bank.record(0).consumed, 25);
        assert_eq!(bank.record(0).pending, 0);

        // Out-of-range reports are ignored.
        bank.apply_report(CostReport { id: ResourceId(9), cost: 99 });
        assert_eq!(bank.total_consumed, 25);
    }
}
