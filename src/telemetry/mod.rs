//! Telemetry for the residency streamer.
//!
//! Structured logging via `tracing` and counters/gauges via the `metrics`
//! facade. Scheduler decisions (activations, evictions, skipped cycles)
//! are recorded here so hosts can watch budget behavior.

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_activation, record_cycle_skipped, record_eviction, record_total_consumed,
};
