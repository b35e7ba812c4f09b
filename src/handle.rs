use super::errors::TaskError;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{sync::oneshot, time::Duration};
use tokio_util::sync::CancellationToken;

/// A task as the pool stores it: erased, boxed, result already routed to the
/// submitter's handle.
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub type TaskResult<T> = Result<T, TaskError>;

/// Handle to a submitted task.
///
/// Resolves to the task's result, or to the [`TaskError`] describing why no
/// result will ever arrive. Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    cancel_token: CancellationToken,
    receiver: oneshot::Receiver<TaskResult<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        cancel_token: CancellationToken,
        receiver: oneshot::Receiver<TaskResult<T>>,
    ) -> Self {
        Self {
            cancel_token,
            receiver,
        }
    }

    /// Request cooperative cancellation. A task that has not started yet
    /// resolves to `TaskError::Cancelled`; a running future is cancelled at
    /// its next await point.
    #[inline]
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Await the result, giving up after `timeout`.
    pub async fn await_timeout(self, timeout: Duration) -> TaskResult<T> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TaskError::Dropped),
            Err(_) => Err(TaskError::Timeout),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = TaskResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            // A dead sender means the task was dropped without running.
            Poll::Ready(res) => Poll::Ready(res.unwrap_or(Err(TaskError::Dropped))),
            Poll::Pending => Poll::Pending,
        }
    }
}
