//! A single pool thread with a one-slot handoff.
//!
//! The handoff is a bounded channel of capacity one: the worker can be running
//! one task while exactly one more waits. Offering a third fails fast with
//! [`LaeError::Busy`] instead of blocking. Shutdown travels over the same
//! channel as a [`Handoff::Stop`] marker, so queued work drains first.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::{LaeError, Result};

/// A unit of work as seen by a worker thread.
pub type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

pub(crate) enum Handoff {
    Task(Job),
    Stop,
}

#[derive(Debug, Default)]
struct Counters {
    // Fed by whoever wraps the task (the executor); drives the fatigue score.
    time_used: AtomicU64,
    // Measured by the run loop itself.
    busy: AtomicU64,
    idle: AtomicU64,
}

pub(crate) fn nanos(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A started worker thread.
///
/// Dropping a `Worker` without calling [`shutdown`](Self::shutdown) closes its
/// handoff, which also ends the thread once it finishes its current task.
pub struct Worker {
    id: usize,
    fatigue_factor: f64,
    handoff: Sender<Handoff>,
    counters: Arc<Counters>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Spawns the thread `lae-worker-<id>` and starts waiting for work.
    pub fn spawn(id: usize, fatigue_factor: f64) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let counters = Arc::new(Counters::default());
        let loop_counters = Arc::clone(&counters);

        let handle = thread::Builder::new()
            .name(format!("lae-worker-{id}"))
            .spawn(move || run_loop(id, rx, &loop_counters))
            .map_err(LaeError::Spawn)?;

        debug!(worker = id, fatigue_factor, "worker started");
        Ok(Self {
            id,
            fatigue_factor,
            handoff: tx,
            counters,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn fatigue_factor(&self) -> f64 {
        self.fatigue_factor
    }

    /// Accumulated task time scaled by this worker's multiplier. Only ever
    /// used to rank workers; never reset.
    pub fn fatigue(&self) -> f64 {
        self.counters.time_used.load(Ordering::Acquire) as f64 * self.fatigue_factor
    }

    /// Adds measured task time to the fatigue accumulator.
    pub fn add_time(&self, elapsed: Duration) {
        self.counters
            .time_used
            .fetch_add(nanos(elapsed), Ordering::AcqRel);
    }

    pub fn time_used(&self) -> Duration {
        Duration::from_nanos(self.counters.time_used.load(Ordering::Acquire))
    }

    /// Wall-clock time the run loop spent inside task bodies.
    pub fn busy_time(&self) -> Duration {
        Duration::from_nanos(self.counters.busy.load(Ordering::Acquire))
    }

    /// Wall-clock time the run loop spent waiting on the handoff.
    pub fn idle_time(&self) -> Duration {
        Duration::from_nanos(self.counters.idle.load(Ordering::Acquire))
    }

    /// Queues `task` without blocking.
    ///
    /// Fails with [`LaeError::Busy`] when a task is already waiting in the
    /// handoff, and with [`LaeError::WorkerStopped`] once the thread has exited.
    pub fn offer<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.offer_job(Box::new(task))
    }

    pub(crate) fn offer_job(&self, job: Job) -> Result<()> {
        match self.handoff.try_send(Handoff::Task(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(LaeError::Busy { worker: self.id }),
            Err(TrySendError::Disconnected(_)) => Err(LaeError::WorkerStopped { worker: self.id }),
        }
    }

    /// Sends the stop marker. Blocks while the handoff is full, i.e. until the
    /// worker has picked up whatever was queued ahead of it.
    pub fn shutdown(&self) {
        if self.handoff.send(Handoff::Stop).is_err() {
            debug!(worker = self.id, "worker already stopped");
        }
    }

    /// Waits for the thread to exit. Later calls return immediately.
    pub fn join(&self) -> Result<()> {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.join().map_err(|payload| {
                LaeError::TaskPanicked(format!(
                    "worker {} thread: {}",
                    self.id,
                    panic_message(&*payload)
                ))
            })?;
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }
}

fn run_loop(id: usize, handoff: Receiver<Handoff>, counters: &Counters) {
    loop {
        let waiting = Instant::now();
        let next = handoff.recv();
        counters
            .idle
            .fetch_add(nanos(waiting.elapsed()), Ordering::AcqRel);

        let job = match next {
            Ok(Handoff::Task(job)) => job,
            Ok(Handoff::Stop) | Err(_) => break,
        };

        let started = Instant::now();
        match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(Ok(())) => {}
            Ok(Err(LaeError::TaskPanicked(msg))) => {
                error!(worker = id, panic = %msg, "task panicked")
            }
            Ok(Err(err)) => warn!(worker = id, error = %err, "task failed"),
            Err(payload) => {
                error!(worker = id, panic = %panic_message(&*payload), "task panicked")
            }
        }
        counters
            .busy
            .fetch_add(nanos(started.elapsed()), Ordering::AcqRel);
    }
    debug!(worker = id, "worker stopped");
}
