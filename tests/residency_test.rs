//! End-to-end tests for the residency streamer against a worker pool.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use texstream::{
    CompletionSignal, CostReporter, Instantiator, ResidencyConfig, ResidencyManager,
    ResourceClass, ResourceId, SourceHandle, WorkerPool, WorkerPoolConfig,
};

/// Observes scheduler decisions; pretends every source costs its length.
#[derive(Default)]
struct SpyInstantiator {
    instantiated: Mutex<Vec<u32>>,
    released: Mutex<Vec<u32>>,
    bounds: AtomicU32,
    gate: Option<Arc<CompletionSignal>>,
}

impl SpyInstantiator {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn gated(gate: Arc<CompletionSignal>) -> Arc<Self> {
        Arc::new(Self { gate: Some(gate), ..Default::default() })
    }
}

impl Instantiator for SpyInstantiator {
    fn set_id_bounds(&self, count: u32) {
        self.bounds.store(count, Ordering::SeqCst);
    }

    fn estimate_cost(&self, _id: ResourceId, handle: &SourceHandle) -> u64 {
        handle.len()
    }

    fn instantiate(&self, id: ResourceId, handle: Arc<SourceHandle>, reporter: CostReporter) {
        if let Some(gate) = &self.gate {
            gate.wait_until_at_least(1);
        }
        // Touch the content the way a decoder would.
        let bytes = handle.read().expect("source should be readable");
        self.instantiated.lock().push(id.0);
        reporter.report_cost(id, bytes.len() as u64);
    }

    fn release(&self, id: ResourceId) {
        self.released.lock().push(id.0);
    }

    fn latch(&self) {}
}

fn config(budget: u64) -> ResidencyConfig {
    ResidencyConfig { budget, budget_per_cycle: u64::MAX, overload_lag: 3 }
}

fn pool() -> WorkerPool {
    WorkerPool::new(WorkerPoolConfig { num_threads: 2, ..Default::default() })
}

fn resource(mgr: &ResidencyManager, cost: usize, priority: i32) -> ResourceId {
    mgr.register_handle(
        SourceHandle::from_bytes("mem://res", vec![0u8; cost]),
        ResourceClass::Color,
        priority,
    )
}

/// Run one cycle against the pool and wait for its batch to complete.
fn cycle(mgr: &ResidencyManager, pool: &WorkerPool, completed: &mut u64) {
    mgr.run_cycle(Some(pool));
    *completed += 1;
    mgr.completion_signal().wait_until_at_least(*completed);
}

#[test]
fn resources_stream_in_under_budget_and_settle() {
    let pool = pool();
    let mgr = ResidencyManager::new(config(64));
    let spy = SpyInstantiator::new();
    mgr.set_instantiator(Some(spy.clone()));

    for _ in 0..4 {
        resource(&mgr, 16, 1);
    }

    let mut completed = 0;
    cycle(&mgr, &pool, &mut completed);
    cycle(&mgr, &pool, &mut completed);

    assert_eq!(spy.instantiated.lock().len(), 4);
    assert_eq!(mgr.current_total_consumed(), 64);
    assert!(spy.released.lock().is_empty());
}

#[test]
fn recently_used_resources_win_under_pressure() {
    let pool = pool();
    let mgr = ResidencyManager::new(config(40));
    let spy = SpyInstantiator::new();
    mgr.set_instantiator(Some(spy.clone()));

    let ids: Vec<_> = (0..4).map(|_| resource(&mgr, 16, 1)).collect();

    let mut completed = 0;
    cycle(&mgr, &pool, &mut completed);
    cycle(&mgr, &pool, &mut completed);

    // Keep two favorites hot; the others should be the eviction victims.
    for _ in 0..8 {
        mgr.mark_used(ids[1]);
        mgr.mark_used(ids[3]);
    }
    mgr.set_budget(32);
    cycle(&mgr, &pool, &mut completed);
    cycle(&mgr, &pool, &mut completed);

    let released = spy.released.lock().clone();
    assert!(released.contains(&ids[0].0) || released.contains(&ids[2].0));
    assert!(!released.contains(&ids[1].0));
    assert!(!released.contains(&ids[3].0));
    assert!(mgr.current_total_consumed() <= 32);
}

#[test]
fn usage_marks_from_many_threads_do_not_block_the_scheduler() {
    let pool = pool();
    let mgr = Arc::new(ResidencyManager::new(config(1024)));
    let spy = SpyInstantiator::new();
    mgr.set_instantiator(Some(spy.clone()));

    let ids: Vec<_> = (0..8).map(|_| resource(&mgr, 8, 1)).collect();

    let mut producers = Vec::new();
    for chunk in ids.chunks(2) {
        let mgr = mgr.clone();
        let chunk = chunk.to_vec();
        producers.push(std::thread::spawn(move || {
            for _ in 0..1000 {
                for &id in &chunk {
                    mgr.mark_used(id);
                }
            }
        }));
    }

    let mut completed = 0;
    for _ in 0..4 {
        cycle(&mgr, &pool, &mut completed);
    }
    for producer in producers {
        producer.join().unwrap();
    }
    cycle(&mgr, &pool, &mut completed);

    assert_eq!(spy.instantiated.lock().len(), 8);
    assert_eq!(mgr.current_total_consumed(), 64);
}

#[test]
fn blocking_cycle_pages_in_one_resource_ahead_of_schedule() {
    let pool = pool();
    let mgr = ResidencyManager::new(config(1024));
    let spy = SpyInstantiator::new();
    mgr.set_instantiator(Some(spy.clone()));

    let _background = resource(&mgr, 32, 1);
    let urgent = resource(&mgr, 32, 1);

    assert!(mgr.run_cycle_blocking(&pool, urgent));
    assert_eq!(spy.instantiated.lock().clone(), vec![urgent.0]);
}

#[test]
fn random_churn_respects_the_overrun_bound() {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let pool = pool();
    let mgr = ResidencyManager::new(config(96));
    let spy = SpyInstantiator::new();
    mgr.set_instantiator(Some(spy.clone()));

    let mut rng = StdRng::seed_from_u64(0x7457);
    let ids: Vec<_> = (0..12)
        .map(|_| resource(&mgr, rng.gen_range(4..=32), 1))
        .collect();

    let mut completed = 0;
    for _ in 0..24 {
        for _ in 0..rng.gen_range(0..6) {
            mgr.mark_used(ids[rng.gen_range(0..ids.len())]);
        }
        cycle(&mgr, &pool, &mut completed);
        // The budget is soft by at most one resource's cost per cycle.
        assert!(mgr.current_total_consumed() < 96 + 32);
    }
}

#[test]
fn teardown_waits_for_in_flight_instantiation() {
    let pool = pool();
    let gate = Arc::new(CompletionSignal::new());
    let mgr = ResidencyManager::new(config(1024));
    let spy = SpyInstantiator::gated(gate.clone());
    mgr.set_instantiator(Some(spy));
    resource(&mgr, 32, 1);

    mgr.run_cycle(Some(&pool)); // instantiation now blocked on the gate

    let dropper = std::thread::spawn(move || drop(mgr));
    std::thread::sleep(Duration::from_millis(50));
    assert!(!dropper.is_finished());

    gate.increment();
    dropper.join().unwrap();
}

#[test]
fn path_registration_roundtrip_through_the_os() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    for name in ["albedo.ktx2", "normal.ktx2"] {
        std::fs::File::create(dir.path().join(name))
            .unwrap()
            .write_all(&[7u8; 24])
            .unwrap();
    }

    let fs = texstream::OsFilesystem::new(dir.path());
    let pool = pool();
    let mgr = ResidencyManager::new(config(1024));
    let spy = SpyInstantiator::new();
    mgr.set_instantiator(Some(spy.clone()));

    let albedo = mgr.register_path(&fs, "albedo.ktx2", ResourceClass::Color, 1);
    let normal = mgr.register_path(&fs, "normal.ktx2", ResourceClass::Normal, 1);
    assert!(albedo.is_valid() && normal.is_valid());
    assert_eq!(mgr.register_path(&fs, "albedo.ktx2", ResourceClass::Color, 1), albedo);

    let mut completed = 0;
    cycle(&mgr, &pool, &mut completed);
    cycle(&mgr, &pool, &mut completed);

    // Costs come from the decoded file sizes.
    assert_eq!(mgr.current_total_consumed(), 48);
}
