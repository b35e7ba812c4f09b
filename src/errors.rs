use thiserror::Error;

/// Why a task finished without producing a value.
///
/// Delivered through the task's [`TaskHandle`](crate::handle::TaskHandle),
/// never through `submit` itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task was cancelled before it completed")]
    Cancelled,

    /// The task was dropped without ever running: evicted by a discard
    /// policy, or still queued when the pool shut down.
    #[error("task was dropped before it could run")]
    Dropped,

    #[error("timed out waiting for the task result")]
    Timeout,
}

/// Why `submit` refused a task.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// Workers are at `max_size`, the queue is at capacity, and the pool is
    /// configured with [`OverflowPolicy::Reject`](crate::pool::OverflowPolicy::Reject).
    #[error("pool saturated: workers and queue are at capacity")]
    Saturated,

    #[error("pool is shut down")]
    Terminated,
}
