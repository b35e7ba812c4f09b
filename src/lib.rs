//! Bounded elastic worker pool with queueing, overflow policies and a
//! recurring-task scheduler.
//!
//! # Features
//! - Worker set grown lazily between a core and a max size
//! - Bounded FIFO hand-off queue with four saturation policies
//!   (reject, run-on-caller, discard, discard-oldest)
//! - Panic isolation: a failing task never takes down its worker
//! - Per-task result handles with cooperative cancellation
//! - Idle non-core workers retire after a configurable timeout
//! - Graceful shutdown, metrics snapshots and background monitoring
//! - Timer-driven scheduler that re-submits recurring jobs to the pool

pub mod errors;
pub mod handle;
pub mod model;
pub mod pool;
pub mod scheduler;

pub use errors::{SubmitError, TaskError};
pub use handle::{TaskHandle, TaskResult};
pub use model::PoolMetrics;
pub use pool::{Config, OverflowPolicy, WorkerPool, WorkerPoolInner};
pub use scheduler::{Recurrence, ScheduledHandle, Scheduler};
