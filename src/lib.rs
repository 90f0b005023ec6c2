//! texstream — budgeted GPU resource residency streamer.
//!
//! Streams a large population of GPU-resident media resources (textures)
//! whose active residency is kept within a dynamic soft budget, favoring
//! recently-used, high-priority content.
//!
//! # Architecture
//!
//! - Producers register resources and mark them used from any thread;
//!   usage marks go through a lock-free channel, cost reports through a
//!   small swap-buffer lock.
//! - A single orchestrator invokes [`ResidencyManager::run_cycle`] once
//!   per synchronization period. The cycle drains the producer queues,
//!   reorders all records by priority/recency, greedily activates under
//!   the budget, evicts under pressure, and dispatches instantiation work
//!   to a [`WorkerPool`].
//! - A counting [`CompletionSignal`] tracks outstanding asynchronous work,
//!   providing back-pressure and safe teardown ordering.
//!
//! The budget is soft: transient overrun is permitted and logged, never
//! rejected, and corrected by the eviction passes on later cycles.

pub mod config;
pub mod residency;
pub mod telemetry;
pub mod worker;

pub use config::{EnvConfig, ResidencyConfig};
pub use residency::{
    CompletionSignal, Cost, CostReporter, Filesystem, Instantiator, OsFilesystem,
    ResidencyManager, ResourceClass, ResourceId, SourceHandle, PERSISTENT_PRIORITY,
};
pub use worker::{WorkerPool, WorkerPoolConfig};
