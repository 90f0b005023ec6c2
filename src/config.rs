//! Configuration loading from environment variables.
//!
//! All values are loaded from `TEXSTREAM_*` environment variables with
//! sensible defaults. Invalid values fall back to defaults without
//! crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `TEXSTREAM_BUDGET` | 536870912 | Soft resident-cost budget (bytes) |
//! | `TEXSTREAM_BUDGET_PER_CYCLE` | 33554432 | Soft per-cycle activation budget (bytes) |
//! | `TEXSTREAM_OVERLOAD_LAG` | 3 | Outstanding cycles before skipping |
//! | `TEXSTREAM_WORKER_THREADS` | 0 | Instantiation workers (0 = auto) |

use crate::residency::Cost;
use crate::worker::WorkerPoolConfig;

const DEFAULT_BUDGET: Cost = 512 * 1024 * 1024;
const DEFAULT_BUDGET_PER_CYCLE: Cost = 32 * 1024 * 1024;
const DEFAULT_OVERLOAD_LAG: u64 = 3;

/// Scheduling configuration for the residency manager.
#[derive(Debug, Clone)]
pub struct ResidencyConfig {
    /// Soft ceiling on aggregate resident cost.
    pub budget: Cost,
    /// Soft ceiling on cost activated within one cycle.
    pub budget_per_cycle: Cost,
    /// How many dispatched-but-incomplete cycles are tolerated before the
    /// scheduler degrades to commit-only cycles.
    pub overload_lag: u64,
}

impl Default for ResidencyConfig {
    fn default() -> Self {
        Self {
            budget: DEFAULT_BUDGET,
            budget_per_cycle: DEFAULT_BUDGET_PER_CYCLE,
            overload_lag: DEFAULT_OVERLOAD_LAG,
        }
    }
}

/// All configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub residency: ResidencyConfig,
    pub worker: WorkerPoolConfig,
}

/// Effective configuration summary, for startup logging.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub budget: Cost,
    pub budget_per_cycle: Cost,
    pub overload_lag: u64,
    pub worker_threads: usize,
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

fn load_residency_config() -> ResidencyConfig {
    let budget = parse_u64("TEXSTREAM_BUDGET", DEFAULT_BUDGET);
    let budget_per_cycle = parse_u64("TEXSTREAM_BUDGET_PER_CYCLE", DEFAULT_BUDGET_PER_CYCLE);
    let overload_lag = parse_u64("TEXSTREAM_OVERLOAD_LAG", DEFAULT_OVERLOAD_LAG);
    let budget_per_cycle = budget_per_cycle.max(1);
    let overload_lag = overload_lag.max(1);
    ResidencyConfig { budget, budget_per_cycle, overload_lag }
}

fn load_worker_config() -> WorkerPoolConfig {
    let num_threads = parse_usize("TEXSTREAM_WORKER_THREADS", 0);
    WorkerPoolConfig { num_threads, ..Default::default() }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    EnvConfig {
        residency: load_residency_config(),
        worker: load_worker_config(),
    }
}

impl EnvConfig {
    /// Return a summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            budget: self.residency.budget,
            budget_per_cycle: self.residency.budget_per_cycle,
            overload_lag: self.residency.overload_lag,
            worker_threads: self.worker.num_threads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_is_unset() {
        let config = load_residency_config();
        assert_eq!(config.budget, DEFAULT_BUDGET);
        assert_eq!(config.budget_per_cycle, DEFAULT_BUDGET_PER_CYCLE);
        assert_eq!(config.overload_lag, DEFAULT_OVERLOAD_LAG);
    }

    // Uses a test-only variable so parallel tests reading the real
    // TEXSTREAM_* keys never observe the mutation.
    #[test]
    fn invalid_values_fall_back_to_default() {
        std::env::set_var("TEXSTREAM_TEST_BAD_LAG", "not-a-number");
        assert_eq!(
            parse_u64("TEXSTREAM_TEST_BAD_LAG", DEFAULT_OVERLOAD_LAG),
            DEFAULT_OVERLOAD_LAG
        );
        std::env::remove_var("TEXSTREAM_TEST_BAD_LAG");
    }

    #[test]
    fn effective_config_mirrors_values() {
        let config = EnvConfig {
            residency: ResidencyConfig { budget: 100, budget_per_cycle: 10, overload_lag: 2 },
            worker: WorkerPoolConfig { num_threads: 4, ..Default::default() },
        };
        let effective = config.effective_config();
        assert_eq!(effective.budget, 100);
        assert_eq!(effective.worker_threads, 4);
    }
}
