//! Worker pool executing instantiation batches.
//!
//! A deliberately small pool: one shared FIFO guarded by a parking_lot
//! mutex with condvar-parked workers. The residency scheduler dispatches a
//! handful of decode jobs per cycle as one batch tied to a
//! `CompletionSignal`; the signal is incremented exactly once when the
//! batch's last job finishes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::residency::CompletionSignal;

/// A unit of instantiation work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads (0 = one per CPU).
    pub num_threads: usize,
    /// Thread name prefix.
    pub thread_name_prefix: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            thread_name_prefix: "texstream-worker".to_string(),
        }
    }
}

/// Errors for worker pool operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    #[error("worker pool is shut down")]
    PoolShutdown,
}

/// Tracks one submitted batch; fires its signal when the last job is done.
struct BatchTracker {
    remaining: AtomicUsize,
    signal: Arc<CompletionSignal>,
}

impl BatchTracker {
    fn job_finished(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.signal.increment();
        }
    }
}

struct QueuedJob {
    job: Job,
    batch: Arc<BatchTracker>,
}

struct Shared {
    queue: Mutex<VecDeque<QueuedJob>>,
    cond: Condvar,
    shutdown: AtomicBool,
}

/// Fixed-size pool of background instantiation workers.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        let num_threads = if config.num_threads == 0 {
            num_cpus::get().max(1)
        } else {
            config.num_threads
        };

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let mut handles = Vec::with_capacity(num_threads);
        for id in 0..num_threads {
            let shared = shared.clone();
            let name = format!("{}-{}", config.thread_name_prefix, id);
            let handle = std::thread::Builder::new()
                .name(name)
                .spawn(move || worker_loop(&shared))
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }

        Self { shared, handles }
    }

    /// Number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.handles.len()
    }

    /// Submit one batch of jobs tied to `signal`. The signal increments
    /// once when all jobs in the batch have run; an empty batch increments
    /// immediately.
    pub fn submit_batch(
        &self,
        jobs: Vec<Job>,
        signal: Arc<CompletionSignal>,
    ) -> Result<(), WorkerPoolError> {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return Err(WorkerPoolError::PoolShutdown);
        }
        if jobs.is_empty() {
            signal.increment();
            return Ok(());
        }

        let batch = Arc::new(BatchTracker {
            remaining: AtomicUsize::new(jobs.len()),
            signal,
        });

        {
            let mut queue = self.shared.queue.lock();
            for job in jobs {
                queue.push_back(QueuedJob { job, batch: batch.clone() });
            }
        }
        self.shared.cond.notify_all();
        Ok(())
    }

    /// Signal shutdown and wait for workers to drain the queue and exit.
    pub fn join(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.cond.notify_all();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let queued = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                // Queued work is always drained before exit so batch
                // signals still fire during shutdown.
                if shared.shutdown.load(Ordering::SeqCst) {
                    break None;
                }
                shared.cond.wait(&mut queue);
            }
        };

        match queued {
            Some(QueuedJob { job, batch }) => {
                job();
                batch.job_finished();
            }
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn batch_signal_fires_once_after_all_jobs() {
        let pool = WorkerPool::new(WorkerPoolConfig { num_threads: 2, ..Default::default() });
        let signal = Arc::new(CompletionSignal::new());
        let counter = Arc::new(AtomicU64::new(0));

        let jobs: Vec<Job> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }) as Job
            })
            .collect();

        pool.submit_batch(jobs, signal.clone()).unwrap();
        signal.wait_until_at_least(1);
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        assert_eq!(signal.count(), 1);
    }

    #[test]
    fn empty_batch_signals_immediately() {
        let pool = WorkerPool::new(WorkerPoolConfig { num_threads: 1, ..Default::default() });
        let signal = Arc::new(CompletionSignal::new());
        pool.submit_batch(Vec::new(), signal.clone()).unwrap();
        assert_eq!(signal.count(), 1);
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let mut pool = WorkerPool::new(WorkerPoolConfig { num_threads: 1, ..Default::default() });
        pool.shutdown_and_join();
        let signal = Arc::new(CompletionSignal::new());
        assert!(pool.submit_batch(Vec::new(), signal).is_err());
    }

    #[test]
    fn queued_jobs_run_before_shutdown_completes() {
        let pool = WorkerPool::new(WorkerPoolConfig { num_threads: 1, ..Default::default() });
        let signal = Arc::new(CompletionSignal::new());
        let jobs: Vec<Job> = (0..4)
            .map(|_| Box::new(|| std::thread::sleep(std::time::Duration::from_millis(5))) as Job)
            .collect();
        pool.submit_batch(jobs, signal.clone()).unwrap();
        pool.join();
        assert_eq!(signal.count(), 1);
    }
}
