//! The budgeted residency manager and its decision loop.
//!
//! Producers register resources, mark them used, and report confirmed
//! costs from any thread. A single orchestrator invokes `run_cycle` once
//! per synchronization period; the cycle drains the producer queues,
//! reorders all records, greedily activates under the soft budget, evicts
//! under pressure, and dispatches instantiation work asynchronously.
//!
//! Locking is two-tier: the cost-report buffer has its own small lock held
//! only for enqueue/swap, while the registry lock guards the whole
//! drain/reorder/decide/mutate sequence as one atomic unit.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ResidencyConfig;
use crate::telemetry;
use crate::worker::{Job, WorkerPool};

use super::instantiator::{CostReporter, Instantiator};
use super::queues::{CostReportBuffer, UsageChannel};
use super::record::{Cost, ResourceClass, ResourceId, PERSISTENT_PRIORITY};
use super::registry::{path_hash, RecordBank};
use super::signal::CompletionSignal;
use super::source::{Filesystem, SourceHandle};

/// Budgeted, priority/LRU-driven residency scheduler.
pub struct ResidencyManager {
    bank: Mutex<RecordBank>,
    usage: UsageChannel,
    cost_reports: Arc<CostReportBuffer>,
    signal: Arc<CompletionSignal>,
    /// Skip a cycle when dispatched batches lead completions by more than
    /// this many cycles.
    overload_lag: u64,
}

impl ResidencyManager {
    pub fn new(config: ResidencyConfig) -> Self {
        Self {
            bank: Mutex::new(RecordBank::new(config.budget, config.budget_per_cycle)),
            usage: UsageChannel::new(),
            cost_reports: Arc::new(CostReportBuffer::new()),
            signal: Arc::new(CompletionSignal::new()),
            overload_lag: config.overload_lag.max(1),
        }
    }

    /// The completion fence tracking outstanding instantiation batches.
    pub fn completion_signal(&self) -> &Arc<CompletionSignal> {
        &self.signal
    }

    /// Number of registered resources.
    pub fn resource_count(&self) -> u32 {
        self.bank.lock().len()
    }

    /// Register a resource backed by an already-open handle.
    pub fn register_handle(
        &self,
        handle: SourceHandle,
        class: ResourceClass,
        priority: i32,
    ) -> ResourceId {
        let mut bank = self.bank.lock();
        bank.register(Arc::new(handle), class, priority)
    }

    /// Register a resource by content path, deduplicating on the path
    /// hash. Returns the existing id if the path was already registered;
    /// `ResourceId::INVALID` if the source cannot be opened.
    pub fn register_path(
        &self,
        fs: &dyn Filesystem,
        path: &str,
        class: ResourceClass,
        priority: i32,
    ) -> ResourceId {
        let hash = path_hash(path);
        let mut bank = self.bank.lock();
        if let Some(id) = bank.find_by_path(hash) {
            return id;
        }

        let handle = match fs.open(path) {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(path, error = %err, "failed to open resource source");
                return ResourceId::INVALID;
            }
        };

        let id = bank.register(Arc::new(handle), class, priority);
        bank.bind_path(hash, id);
        id
    }

    /// Record a use of `id` this work cycle. Lock-free; callable from any
    /// thread on a hot per-frame path.
    pub fn mark_used(&self, id: ResourceId) {
        self.usage.mark(id);
    }

    /// Report the confirmed resident cost of a completed instantiation.
    /// Applied by the next cycle.
    pub fn report_cost(&self, id: ResourceId, cost: Cost) {
        self.cost_reports.push(id, cost);
    }

    /// A cloneable reporter handle for instantiation work.
    pub fn reporter(&self) -> CostReporter {
        CostReporter::new(self.cost_reports.clone())
    }

    /// Update a resource's priority in place. Returns false if `id` is
    /// out of bounds.
    pub fn set_priority(&self, id: ResourceId, priority: i32) -> bool {
        let mut bank = self.bank.lock();
        match bank.get_mut(id) {
            Some(record) => {
                record.priority = priority;
                true
            }
            None => false,
        }
    }

    /// Soft ceiling on aggregate resident cost.
    pub fn set_budget(&self, cost: Cost) {
        self.bank.lock().budget = cost;
    }

    /// Soft ceiling on cost activated within a single cycle.
    pub fn set_budget_per_cycle(&self, cost: Cost) {
        self.bank.lock().budget_per_cycle = cost;
    }

    /// Current `consumed + pending` sum across all records.
    pub fn current_total_consumed(&self) -> Cost {
        self.bank.lock().total_consumed
    }

    /// Attach or replace the page-in/page-out collaborator.
    ///
    /// Replacing an attached instantiator first drains the completion
    /// signal, releases every id on the old collaborator, and zeroes all
    /// residency bookkeeping before notifying the new one.
    pub fn set_instantiator(&self, iface: Option<Arc<dyn Instantiator>>) {
        let (old, target) = {
            let bank = self.bank.lock();
            (bank.iface.clone(), bank.dispatch_target())
        };
        if old.is_some() {
            self.signal.wait_until_at_least(target);
        }

        let mut bank = self.bank.lock();
        if let Some(old) = &old {
            for index in 0..bank.len() {
                old.release(ResourceId(index));
            }
        }
        bank.reset_residency();
        bank.iface = iface;
        if let Some(new_iface) = bank.iface.clone() {
            new_iface.set_id_bounds(bank.len());
            for index in 0..bank.len() {
                let id = ResourceId(index);
                if let Some(record) = bank.get(id) {
                    new_iface.set_class(id, record.class);
                }
            }
        }
    }

    /// Run one scheduling cycle. Must not run concurrently with itself;
    /// invoked once per synchronization period by a single orchestrator.
    ///
    /// With no pool attached, instantiation jobs run inline on the calling
    /// thread; the completion signal still advances once per cycle.
    pub fn run_cycle(&self, pool: Option<&WorkerPool>) {
        let mut bank = self.bank.lock();
        let Some(iface) = bank.iface.clone() else {
            return;
        };

        // Absorb timestamp advances owed by blocking dispatches.
        bank.timestamp += bank.deferred_advances;
        bank.deferred_advances = 0;

        // Degraded mode: too much instantiation work still in flight.
        let completed = self.signal.count();
        if completed + self.overload_lag < bank.timestamp {
            tracing::info!(
                outstanding = bank.timestamp - completed,
                "skipping residency cycle: too much instantiation work in flight"
            );
            telemetry::record_cycle_skipped();
            iface.latch();
            return;
        }

        self.drain_queues(&mut bank);
        bank.reorder();

        let jobs = self.activate_and_evict(&mut bank, &iface);

        telemetry::record_total_consumed(bank.total_consumed);
        iface.latch();
        bank.timestamp += 1;
        drop(bank);

        self.dispatch(pool, jobs);
    }

    /// Single-resource synchronous variant: if `id` is not resident,
    /// dispatch its instantiation immediately, bypassing the sort and
    /// eviction passes, and wait for that dispatch to complete. The owed
    /// timestamp advance is applied by the next full cycle.
    ///
    /// Returns false if no instantiator is attached or `id` is out of
    /// bounds.
    pub fn run_cycle_blocking(&self, pool: &WorkerPool, id: ResourceId) -> bool {
        let target = {
            let mut bank = self.bank.lock();
            let Some(iface) = bank.iface.clone() else {
                return false;
            };

            self.drain_queues(&mut bank);

            let Some(record) = bank.get(id) else {
                return false;
            };
            if record.is_resident() {
                return true;
            }

            let handle = record.handle.clone();
            let estimate = iface.estimate_cost(id, &handle);
            let timestamp = bank.timestamp;
            let record = bank.record_mut(id.index());
            record.pending = estimate;
            record.last_used = timestamp;
            bank.total_consumed += estimate;
            bank.deferred_advances += 1;
            let target = bank.dispatch_target();
            drop(bank);

            let reporter = CostReporter::new(self.cost_reports.clone());
            let job: Job = Box::new(move || iface.instantiate(id, handle, reporter));
            if pool.submit_batch(vec![job], self.signal.clone()).is_err() {
                // Pool is shutting down; keep the fence consistent.
                self.signal.increment();
            }
            target
        };

        self.signal.wait_until_at_least(target);
        true
    }

    /// Drain both producer queues under the registry lock.
    fn drain_queues(&self, bank: &mut RecordBank) {
        let mut reports = std::mem::take(&mut bank.report_scratch);
        self.cost_reports.swap_into(&mut reports);
        for report in reports.drain(..) {
            bank.apply_report(report);
        }
        bank.report_scratch = reports;

        self.usage.drain(|id| bank.touch(id));
    }

    /// Greedy activation walk from the front of the reorder buffer, with
    /// tail eviction under pressure, followed by the proactive eviction
    /// pass. Returns the instantiation jobs to dispatch.
    fn activate_and_evict(
        &self,
        bank: &mut RecordBank,
        iface: &Arc<dyn Instantiator>,
    ) -> Vec<Job> {
        let mut jobs: Vec<Job> = Vec::new();
        let reporter = CostReporter::new(self.cost_reports.clone());

        let mut release_index = bank.scratch.len();
        let mut activate_index = 0usize;
        let mut activated_cost: Cost = 0;
        let mut activation_count: u32 = 0;
        let mut can_activate = true;

        // Activate in order from highest rank to lowest while in budget.
        // An empty bank may admit one activation even under a zero budget
        // so that forward progress never stalls permanently.
        while can_activate
            && (bank.total_consumed < bank.budget
                || (activation_count == 0 && bank.total_consumed == 0))
            && activated_cost < bank.budget_per_cycle
            && activate_index != release_index
        {
            let index = bank.scratch[activate_index];
            if bank.record(index).priority <= 0 {
                break;
            }
            if bank.record(index).is_resident() {
                activate_index += 1;
                continue;
            }

            let (id, handle, priority) = {
                let record = bank.record(index);
                (record.id, record.handle.clone(), record.priority)
            };
            let estimate = iface.estimate_cost(id, &handle);

            can_activate = bank.total_consumed + estimate <= bank.budget
                || priority >= PERSISTENT_PRIORITY;

            // Try to free the tail before giving up on this candidate.
            while !can_activate && activate_index + 1 != release_index {
                release_index -= 1;
                let victim = bank.scratch[release_index];
                if bank.record(victim).consumed != 0 {
                    let victim_id = bank.record(victim).id;
                    tracing::info!(id = victim_id.0, "releasing resource due to page-in pressure");
                    telemetry::record_eviction();
                    iface.release(victim_id);
                    bank.total_consumed -= bank.record(victim).consumed;
                    bank.record_mut(victim).consumed = 0;
                }
                can_activate = bank.total_consumed + estimate <= bank.budget;
            }

            if !can_activate {
                // Soft budget: a cycle may run over by at most one
                // resource's cost. Admit the overshoot while still under
                // budget (the walk stops once over), or from an empty bank
                // so a budget smaller than any single resource still makes
                // progress.
                can_activate = (activation_count > 0 && bank.total_consumed < bank.budget)
                    || (activation_count == 0 && bank.total_consumed == 0);
            }

            if can_activate {
                let job_iface = iface.clone();
                let job_reporter = reporter.clone();
                let job_handle = handle.clone();
                jobs.push(Box::new(move || {
                    job_iface.instantiate(id, job_handle, job_reporter);
                }));
                activation_count += 1;

                bank.record_mut(index).pending = estimate;
                bank.total_consumed += estimate;
                activated_cost += estimate;
                activate_index += 1;
            }
        }

        // Proactive eviction: over the full budget, or past 75% of it
        // while the lowest-ranked resident carries no priority.
        let low_budget = (bank.budget / 4) * 3;
        while release_index != activate_index {
            let tail = bank.scratch[release_index - 1];
            if bank.record(tail).priority == PERSISTENT_PRIORITY {
                break;
            }
            let over_budget = bank.total_consumed > bank.budget;
            let low_pressure =
                bank.total_consumed > low_budget && bank.record(tail).priority == 0;
            if !over_budget && !low_pressure {
                break;
            }

            release_index -= 1;
            if bank.record(tail).consumed != 0 {
                let tail_id = bank.record(tail).id;
                tracing::info!(id = tail_id.0, "releasing resource to shed budget pressure");
                telemetry::record_eviction();
                iface.release(tail_id);
                bank.total_consumed -= bank.record(tail).consumed;
                let record = bank.record_mut(tail);
                record.consumed = 0;
                record.last_used = 0;
            }
        }

        if activated_cost > 0 {
            tracing::info!(
                count = activation_count,
                kib = activated_cost / 1024,
                "activated resources"
            );
            telemetry::record_activation(activation_count, activated_cost);
        }
        if bank.total_consumed > bank.budget {
            tracing::debug!(
                total = bank.total_consumed,
                budget = bank.budget,
                "resident cost over soft budget"
            );
        }

        jobs
    }

    /// Dispatch one cycle's jobs as a single batch tied to the completion
    /// signal. Without a pool the jobs run inline.
    fn dispatch(&self, pool: Option<&WorkerPool>, jobs: Vec<Job>) {
        match pool {
            Some(pool) => {
                if pool.submit_batch(jobs, self.signal.clone()).is_err() {
                    tracing::warn!("worker pool rejected instantiation batch during shutdown");
                    self.signal.increment();
                }
            }
            None => {
                for job in jobs {
                    job();
                }
                self.signal.increment();
            }
        }
    }
}

impl Drop for ResidencyManager {
    fn drop(&mut self) {
        // In-flight jobs may still reference collaborator state for
        // registered ids; drain every dispatched batch before the record
        // storage goes away.
        let target = self.bank.get_mut().dispatch_target();
        self.signal.wait_until_at_least(target);
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
