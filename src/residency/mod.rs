//! GPU resource residency: registry, producer queues, and the budgeted
//! scheduling loop.

mod instantiator;
mod manager;
mod queues;
mod record;
mod registry;
mod signal;
mod source;

pub use instantiator::{CostReporter, Instantiator};
pub use manager::ResidencyManager;
pub use record::{
    Cost, CostReport, ResourceClass, ResourceId, ResourceRecord, PERSISTENT_PRIORITY,
};
pub use signal::CompletionSignal;
pub use source::{Filesystem, OsFilesystem, SourceBytes, SourceError, SourceHandle};
