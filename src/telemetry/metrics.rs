//! Metric recording helpers on the `metrics` facade.
//!
//! No exporter is installed here; hosts that want the numbers install
//! their own recorder.

use metrics::{counter, gauge};

/// Record one cycle's activations and their reserved cost.
pub fn record_activation(count: u32, bytes: u64) {
    counter!("texstream_activations_total").increment(u64::from(count));
    counter!("texstream_activated_bytes_total").increment(bytes);
}

/// Record a single eviction.
pub fn record_eviction() {
    counter!("texstream_evictions_total").increment(1);
}

/// Record a cycle skipped due to outstanding instantiation work.
pub fn record_cycle_skipped() {
    counter!("texstream_cycles_skipped_total").increment(1);
}

/// Record the aggregate resident cost after a cycle.
pub fn record_total_consumed(bytes: u64) {
    gauge!("texstream_total_consumed_bytes").set(bytes as f64);
}
