//! Fatigue-weighted executor.
//!
//! Idle workers sit in a min-heap keyed by fatigue score. `submit` pops the
//! least fatigued one (blocking while the heap is empty) and hands it a task
//! wrapped with timing and bookkeeping. `submit_all` is a fork/join barrier on
//! top of that: it returns once the in-flight counter drops back to zero.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::cancel::CancelToken;
use super::worker::{Job, Worker, panic_message};
use crate::error::{LaeError, Result};

// How often a cancellable submit re-checks its token while waiting.
const CANCEL_POLL: Duration = Duration::from_millis(5);

// First failure of one `submit_all` batch.
type FailureSlot = Arc<Mutex<Option<LaeError>>>;

/// Pool construction parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    pub workers: usize,
    /// Inclusive range the per-worker fatigue multiplier is drawn from.
    pub fatigue_range: (f64, f64),
    /// Fixes the multipliers for reproducible runs.
    pub seed: Option<u64>,
}

impl ExecutorConfig {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            fatigue_range: (0.5, 1.5),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_fatigue_range(mut self, low: f64, high: f64) -> Self {
        self.fatigue_range = (low, high);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.workers < 1 {
            return Err(LaeError::InvalidArgument(
                "worker count must be at least 1".into(),
            ));
        }
        let (low, high) = self.fatigue_range;
        if !(low > 0.0 && low <= high && high.is_finite()) {
            return Err(LaeError::InvalidArgument(format!(
                "fatigue range [{low}, {high}] must be positive and ordered"
            )));
        }
        Ok(())
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new(workers)
    }
}

#[derive(Debug, Clone, Copy)]
struct IdleEntry {
    fatigue: f64,
    worker: usize,
}

// Reversed so the std max-heap pops the least fatigued worker; ties go to the
// lower worker id.
impl Ord for IdleEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .fatigue
            .total_cmp(&self.fatigue)
            .then_with(|| other.worker.cmp(&self.worker))
    }
}

impl PartialOrd for IdleEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IdleEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for IdleEntry {}

/// Per-worker activity numbers for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSnapshot {
    pub id: usize,
    pub fatigue_factor: f64,
    pub fatigue: f64,
    pub time_used: Duration,
    pub busy_time: Duration,
    pub time_idle: Duration,
}

impl fmt::Display for WorkerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Worker {}: Fatigue={:.2}, TimeUsed={}, TimeIdle={}",
            self.id,
            self.fatigue,
            self.time_used.as_nanos(),
            self.time_idle.as_nanos()
        )
    }
}

struct Shared {
    workers: Vec<Worker>,
    idle: Mutex<BinaryHeap<IdleEntry>>,
    worker_ready: Condvar,
    in_flight: Mutex<usize>,
    drained: Condvar,
    shut_down: AtomicBool,
}

impl Shared {
    fn take_idle(&self, cancel: Option<&CancelToken>) -> Result<usize> {
        let mut idle = self.idle.lock();
        loop {
            if self.shut_down.load(Ordering::Acquire) {
                return Err(LaeError::ShutDown);
            }
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(LaeError::Interrupted);
            }
            if let Some(entry) = idle.pop() {
                return Ok(entry.worker);
            }
            match cancel {
                Some(_) => {
                    self.worker_ready.wait_for(&mut idle, CANCEL_POLL);
                }
                None => self.worker_ready.wait(&mut idle),
            }
        }
    }

    fn release(&self, worker: usize) {
        let fatigue = self.workers[worker].fatigue();
        self.idle.lock().push(IdleEntry { fatigue, worker });
        self.worker_ready.notify_one();

        let mut in_flight = self.in_flight.lock();
        *in_flight = in_flight.saturating_sub(1);
        if *in_flight == 0 {
            self.drained.notify_all();
        }
    }

    // Runs on the worker thread. A batch failure is recorded before the
    // in-flight decrement so the barrier waiter always sees it. Panics stay
    // `TaskPanicked` on the way back to the worker loop.
    fn run_wrapped(&self, worker: usize, task: Job, batch: Option<&FailureSlot>) -> Result<()> {
        let started = Instant::now();
        let outcome = match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(result) => result,
            Err(payload) => Err(LaeError::TaskPanicked(panic_message(&*payload))),
        };
        self.workers[worker].add_time(started.elapsed());

        let reported = outcome.map_err(|err| {
            let summary = match &err {
                LaeError::TaskPanicked(msg) => LaeError::TaskPanicked(msg.clone()),
                other => LaeError::TaskFailed(other.to_string()),
            };
            if let Some(slot) = batch {
                let mut first = slot.lock();
                if first.is_none() {
                    *first = Some(err);
                }
            }
            summary
        });
        self.release(worker);
        reported
    }
}

/// Fixed pool of [`Worker`]s dispatched least-fatigued first.
pub struct Executor {
    shared: Arc<Shared>,
}

impl Executor {
    /// Starts `workers` threads with random fatigue multipliers in [0.5, 1.5].
    pub fn new(workers: usize) -> Result<Self> {
        Self::with_config(ExecutorConfig::new(workers))
    }

    pub fn with_config(config: ExecutorConfig) -> Result<Self> {
        config.validate()?;
        let (low, high) = config.fatigue_range;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let workers = (0..config.workers)
            .map(|id| Worker::spawn(id, rng.gen_range(low..=high)))
            .collect::<Result<Vec<_>>>()?;
        let idle = workers
            .iter()
            .map(|w| IdleEntry {
                fatigue: w.fatigue(),
                worker: w.id(),
            })
            .collect();

        info!(workers = config.workers, "executor started");
        Ok(Self {
            shared: Arc::new(Shared {
                workers,
                idle: Mutex::new(idle),
                worker_ready: Condvar::new(),
                in_flight: Mutex::new(0),
                drained: Condvar::new(),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.shared.workers.len()
    }

    /// Tasks handed to workers and not yet finished.
    pub fn in_flight(&self) -> usize {
        *self.shared.in_flight.lock()
    }

    pub fn idle_workers(&self) -> usize {
        self.shared.idle.lock().len()
    }

    /// Hands `task` to the least fatigued idle worker, blocking until one is
    /// free. Does not wait for the task to finish; a failure is only logged.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.dispatch(Box::new(task), None, None)
    }

    /// Like [`submit`](Self::submit), but gives up with
    /// [`LaeError::Interrupted`] if `cancel` fires while waiting for a worker.
    pub fn submit_cancellable<F>(&self, task: F, cancel: &CancelToken) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.dispatch(Box::new(task), Some(cancel), None)
    }

    fn dispatch(
        &self,
        task: Job,
        cancel: Option<&CancelToken>,
        batch: Option<FailureSlot>,
    ) -> Result<()> {
        let worker = self.shared.take_idle(cancel)?;
        *self.shared.in_flight.lock() += 1;

        let shared = Arc::clone(&self.shared);
        let wrapped: Job = Box::new(move || shared.run_wrapped(worker, task, batch.as_ref()));
        if let Err(err) = self.shared.workers[worker].offer_job(wrapped) {
            self.shared.release(worker);
            return Err(err);
        }
        debug!(worker, "task dispatched");
        Ok(())
    }

    /// Submits every task, then blocks until the in-flight count is zero.
    ///
    /// Returns the first failure among this batch's tasks, if any.
    pub fn submit_all<I, F>(&self, tasks: I) -> Result<()>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let failures: FailureSlot = Arc::new(Mutex::new(None));
        let mut submit_error = None;
        for task in tasks {
            if let Err(err) = self.dispatch(Box::new(task), None, Some(Arc::clone(&failures))) {
                submit_error = Some(err);
                break;
            }
        }

        {
            let mut in_flight = self.shared.in_flight.lock();
            while *in_flight > 0 {
                self.shared.drained.wait(&mut in_flight);
            }
        }

        let failed = failures.lock().take();
        match submit_error.or(failed) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stops every worker after it drains its handoff, then joins them.
    /// Calling it again is a no-op.
    pub fn shutdown(&self) -> Result<()> {
        if self.shared.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        {
            let _idle = self.shared.idle.lock();
            self.shared.worker_ready.notify_all();
        }

        for worker in &self.shared.workers {
            worker.shutdown();
        }
        let mut joined = Ok(());
        for worker in &self.shared.workers {
            if let Err(err) = worker.join() {
                joined = joined.and(Err(err));
            }
        }

        *self.shared.in_flight.lock() = 0;
        self.shared.drained.notify_all();
        info!("executor shut down");
        joined
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> Vec<WorkerSnapshot> {
        self.shared
            .workers
            .iter()
            .map(|w| WorkerSnapshot {
                id: w.id(),
                fatigue_factor: w.fatigue_factor(),
                fatigue: w.fatigue(),
                time_used: w.time_used(),
                busy_time: w.busy_time(),
                time_idle: w.idle_time(),
            })
            .collect()
    }

    /// One line per worker: identity, fatigue, time used and time idle.
    pub fn worker_report(&self) -> String {
        self.stats()
            .iter()
            .map(|s| format!("{s}\n"))
            .collect()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
