//! Fatigue-weighted thread pool.
//!
//! Two independent layers of backpressure:
//! - `worker`: each thread owns a one-slot handoff; offering to a full one
//!   fails immediately.
//! - `executor`: submitters block until some worker is idle, and always pick
//!   the least fatigued one.

pub mod cancel;
pub mod executor;
pub mod worker;

pub use cancel::CancelToken;
pub use executor::{Executor, ExecutorConfig, WorkerSnapshot};
pub use worker::{Job, Worker};
