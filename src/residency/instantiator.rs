//! External contract for the page-in/page-out collaborator.

use std::sync::Arc;

use super::queues::CostReportBuffer;
use super::record::{Cost, ResourceClass, ResourceId};
use super::source::SourceHandle;

/// Handle through which instantiation work reports confirmed cost back to
/// the scheduler. Cheap to clone into jobs.
///
/// A report that lands after its resource was evicted resurrects the
/// record's `consumed` value until the next eviction pass corrects it.
/// That staleness window is accepted; reports are not epoch-tagged.
#[derive(Clone)]
pub struct CostReporter {
    buffer: Arc<CostReportBuffer>,
}

impl CostReporter {
    pub(crate) fn new(buffer: Arc<CostReportBuffer>) -> Self {
        Self { buffer }
    }

    /// Report the actual resident cost for `id`. Applied by the scheduler
    /// on its next cycle.
    pub fn report_cost(&self, id: ResourceId, cost: Cost) {
        self.buffer.push(id, cost);
    }
}

/// Collaborator performing actual GPU page-in/page-out.
///
/// The scheduler assumes nothing about the implementation beyond this
/// contract: `estimate_cost` is pure and cheap, `instantiate` eventually
/// reports its confirmed cost through the reporter, `release` is safe to
/// call immediately and must not block on in-flight instantiation of the
/// same id, and `latch` commits all handle changes for the cycle.
pub trait Instantiator: Send + Sync {
    /// New upper bound on assigned ids. Called under the registry lock
    /// whenever a resource is registered.
    fn set_id_bounds(&self, count: u32);

    /// Resource class for an id. Default implementations may ignore this.
    fn set_class(&self, _id: ResourceId, _class: ResourceClass) {}

    /// Estimate the resident cost of instantiating `id`.
    fn estimate_cost(&self, id: ResourceId, handle: &SourceHandle) -> Cost;

    /// Page the resource in. Runs on a worker thread (or inline when the
    /// scheduler has no pool); must eventually call
    /// `reporter.report_cost(id, actual_cost)`.
    fn instantiate(&self, id: ResourceId, handle: Arc<SourceHandle>, reporter: CostReporter);

    /// Page the resource out. Synchronous.
    fn release(&self, id: ResourceId);

    /// Commit all handle changes made this cycle.
    fn latch(&self);
}
