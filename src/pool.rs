use super::{
    errors::{SubmitError, TaskError},
    handle::{Task, TaskHandle, TaskResult},
    model::PoolMetrics,
};
use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};
use crossbeam::queue::ArrayQueue;
use futures::FutureExt;
use tokio::{
    sync::{oneshot, Notify},
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What happens when workers are at `max_size` and the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// `submit` fails with [`SubmitError::Saturated`].
    #[default]
    Reject,
    /// The task runs inline in the submitting context, providing
    /// backpressure. The only case where `submit` suspends.
    CallerRuns,
    /// The task is dropped without running; `submit` reports success.
    Discard,
    /// The oldest queued task is evicted without running and the new task
    /// takes its place in the queue.
    DiscardOldest,
}

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Workers kept alive even when idle.
    pub core_size: usize,
    /// Hard cap on concurrently live workers.
    pub max_size: usize,
    /// Pending tasks held before the overflow policy applies. Must be >= 1.
    pub queue_capacity: usize,
    /// How long a non-core worker sits idle before retiring.
    pub idle_timeout: Duration,
    pub overflow_policy: OverflowPolicy,
    /// Prefix for worker names in log output.
    pub worker_name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            core_size: num_cpus,
            max_size: num_cpus * 2,
            queue_capacity: num_cpus * 20,
            idle_timeout: Duration::from_secs(30),
            overflow_policy: OverflowPolicy::default(),
            worker_name_prefix: "worker-".to_string(),
        }
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            core_size: num_cpus,
            max_size: num_cpus,
            queue_capacity: num_cpus * 10,
            idle_timeout: Duration::from_secs(60),
            ..Default::default()
        }
    }

    pub fn io_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            core_size: num_cpus,
            max_size: num_cpus * 4,
            queue_capacity: num_cpus * 20,
            idle_timeout: Duration::from_secs(10),
            overflow_policy: OverflowPolicy::CallerRuns,
            ..Default::default()
        }
    }
}

pub type WorkerPool = Arc<WorkerPoolInner>;

/// Bounded elastic worker pool.
///
/// Workers are spawned lazily: up to `core_size` one-per-task, then tasks
/// queue, then the worker set grows to `max_size`, then the configured
/// [`OverflowPolicy`] applies. Idle non-core workers retire after
/// `idle_timeout`.
pub struct WorkerPoolInner {
    queue: ArrayQueue<Task>,
    notify: Notify,
    shutdown_token: CancellationToken,
    closed: AtomicBool,
    worker_count: AtomicUsize,
    worker_seq: AtomicUsize,
    idle_workers: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    drained: Arc<Notify>,
    total_submitted: AtomicUsize,
    completed_tasks: Arc<AtomicUsize>,
    failed_tasks: Arc<AtomicUsize>,
    rejected_tasks: AtomicUsize,
    discarded_tasks: AtomicUsize,
    config: Config,
}

/// Outcome of routing one task through the dispatch chain.
enum Dispatch {
    Accepted,
    RunInline(Task),
    Rejected,
}

/// Releases one unit of in-flight accounting when the task finishes, or when
/// the task is dropped without ever running (discarded, shutdown).
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl WorkerPoolInner {
    pub fn new(core_size: usize, max_size: usize, queue_capacity: usize) -> WorkerPool {
        let config = Config {
            core_size,
            max_size,
            queue_capacity,
            ..Default::default()
        };
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> WorkerPool {
        assert!(config.max_size >= 1, "max_size must be at least 1");
        assert!(
            config.core_size <= config.max_size,
            "core_size must not exceed max_size"
        );
        assert!(config.queue_capacity >= 1, "queue_capacity must be at least 1");

        Arc::new(WorkerPoolInner {
            queue: ArrayQueue::new(config.queue_capacity),
            notify: Notify::new(),
            shutdown_token: CancellationToken::new(),
            closed: AtomicBool::new(false),
            worker_count: AtomicUsize::new(0),
            worker_seq: AtomicUsize::new(0),
            idle_workers: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
            total_submitted: AtomicUsize::new(0),
            completed_tasks: Arc::new(AtomicUsize::new(0)),
            failed_tasks: Arc::new(AtomicUsize::new(0)),
            rejected_tasks: AtomicUsize::new(0),
            discarded_tasks: AtomicUsize::new(0),
            config,
        })
    }

    /// Submit a future for execution.
    ///
    /// Returns synchronously in every configuration except
    /// [`OverflowPolicy::CallerRuns`] under saturation, where the task runs
    /// inline before this call returns.
    pub async fn submit<T, F>(self: &Arc<Self>, fut: F) -> Result<TaskHandle<T>, SubmitError>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubmitError::Terminated);
        }

        let (task, handle) = self.wrap(fut);

        match self.dispatch(task) {
            Dispatch::Accepted => Ok(handle),
            Dispatch::RunInline(task) => {
                task.await;
                Ok(handle)
            }
            Dispatch::Rejected => {
                self.rejected_tasks.fetch_add(1, Ordering::Relaxed);
                Err(SubmitError::Saturated)
            }
        }
    }

    /// Submit a blocking closure. The closure is offloaded to the blocking
    /// thread pool so it never stalls a worker's executor thread.
    pub async fn submit_blocking<T, F>(self: &Arc<Self>, f: F) -> Result<TaskHandle<T>, SubmitError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.submit(async move {
            match tokio::task::spawn_blocking(f).await {
                Ok(value) => value,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => std::panic::panic_any("blocking task aborted: runtime shutting down"),
            }
        })
        .await
    }

    /// Spawn core workers up front instead of waiting for submissions.
    pub fn prestart_core_workers(self: &Arc<Self>) {
        while self.try_spawn_worker(None, self.config.core_size).is_ok() {}
    }

    /// Wraps a future into an erased task that reports its outcome through
    /// the returned handle and keeps the pool counters honest even if the
    /// task is dropped without running.
    fn wrap<T, F>(&self, fut: F) -> (Task, TaskHandle<T>)
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<TaskResult<T>>();
        let cancel_token = CancellationToken::new();
        let cancel = cancel_token.clone();

        self.total_submitted.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);

        let completed = self.completed_tasks.clone();
        let failed = self.failed_tasks.clone();
        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
            drained: self.drained.clone(),
        };

        let task: Task = Box::pin(async move {
            let _guard = guard;

            // Biased so a cancellation issued before the task starts always
            // wins over an immediately-ready future.
            let result: TaskResult<T> = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TaskError::Cancelled),
                res = AssertUnwindSafe(fut).catch_unwind() => {
                    res.map_err(|panic| TaskError::Panicked(panic_message(panic)))
                }
            };

            if result.is_ok() {
                completed.fetch_add(1, Ordering::Relaxed);
            } else {
                failed.fetch_add(1, Ordering::Relaxed);
            }

            let _ = tx.send(result);
        });

        (task, TaskHandle::new(cancel_token, rx))
    }

    // Dispatch chain: grow to core, queue, grow to max, overflow policy.
    fn dispatch(self: &Arc<Self>, task: Task) -> Dispatch {
        let mut task = task;

        if self.worker_count.load(Ordering::Relaxed) < self.config.core_size {
            match self.try_spawn_worker(Some(task), self.config.core_size) {
                Ok(()) => {
                    debug!("task handed to a fresh core worker");
                    return Dispatch::Accepted;
                }
                Err(returned) => match returned {
                    Some(t) => task = t,
                    None => return Dispatch::Accepted,
                },
            }
        }

        match self.queue.push(task) {
            Ok(()) => {
                // The last worker may have retired between our load and the
                // push; make sure someone is alive to drain the queue.
                if self.worker_count.load(Ordering::Acquire) == 0 {
                    let _ = self.try_spawn_worker(None, self.config.max_size);
                }
                self.notify_idle();
                debug!(queued = self.queue.len(), "task queued");
                return Dispatch::Accepted;
            }
            Err(t) => task = t,
        }

        match self.try_spawn_worker(Some(task), self.config.max_size) {
            Ok(()) => {
                debug!("queue full; task handed to a fresh non-core worker");
                return Dispatch::Accepted;
            }
            Err(returned) => match returned {
                Some(t) => task = t,
                None => return Dispatch::Accepted,
            },
        }

        self.apply_overflow(task)
    }

    fn apply_overflow(&self, task: Task) -> Dispatch {
        match self.config.overflow_policy {
            OverflowPolicy::Reject => {
                warn!("pool saturated; rejecting task");
                Dispatch::Rejected
            }
            OverflowPolicy::CallerRuns => {
                debug!("pool saturated; running task on the submitter");
                Dispatch::RunInline(task)
            }
            OverflowPolicy::Discard => {
                debug!("pool saturated; discarding incoming task");
                self.discarded_tasks.fetch_add(1, Ordering::Relaxed);
                drop(task);
                Dispatch::Accepted
            }
            OverflowPolicy::DiscardOldest => {
                let mut task = task;
                loop {
                    match self.queue.pop() {
                        Some(oldest) => {
                            debug!("pool saturated; evicting oldest queued task");
                            self.discarded_tasks.fetch_add(1, Ordering::Relaxed);
                            drop(oldest);
                        }
                        None => {
                            // Nothing left to evict; shed the incoming task.
                            self.discarded_tasks.fetch_add(1, Ordering::Relaxed);
                            drop(task);
                            return Dispatch::Accepted;
                        }
                    }
                    match self.queue.push(task) {
                        Ok(()) => {
                            self.notify_idle();
                            return Dispatch::Accepted;
                        }
                        Err(t) => task = t,
                    }
                }
            }
        }
    }

    fn try_spawn_worker(
        self: &Arc<Self>,
        initial: Option<Task>,
        limit: usize,
    ) -> Result<(), Option<Task>> {
        let mut count = self.worker_count.load(Ordering::Relaxed);
        loop {
            if count >= limit {
                return Err(initial);
            }
            match self.worker_count.compare_exchange_weak(
                count,
                count + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => count = actual,
            }
        }

        let id = self.worker_seq.fetch_add(1, Ordering::Relaxed);
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            pool.worker_loop(id, initial).await;
        });

        Ok(())
    }

    async fn worker_loop(self: Arc<Self>, id: usize, mut initial: Option<Task>) {
        let name = format!("{}{}", self.config.worker_name_prefix, id);
        debug!(worker = %name, "worker started");

        'run: loop {
            // Drain: initial task first, then FIFO from the shared queue.
            loop {
                if self.shutdown_token.is_cancelled() {
                    break 'run;
                }
                match initial.take().or_else(|| self.queue.pop()) {
                    Some(task) => task.await,
                    None => break,
                }
            }

            self.idle_workers.fetch_add(1, Ordering::Release);
            // A task may have landed between the last pop and going idle.
            if !self.queue.is_empty() {
                self.idle_workers.fetch_sub(1, Ordering::Acquire);
                continue 'run;
            }

            let timed_out = tokio::select! {
                _ = self.notify.notified() => false,
                _ = self.shutdown_token.cancelled() => {
                    self.idle_workers.fetch_sub(1, Ordering::Acquire);
                    break 'run;
                }
                _ = tokio::time::sleep(self.config.idle_timeout) => true,
            };
            self.idle_workers.fetch_sub(1, Ordering::Acquire);

            if timed_out && self.try_retire() {
                debug!(worker = %name, "idle worker retired");
                // A task pushed while we were deciding must not be stranded.
                if !self.queue.is_empty() {
                    self.notify.notify_one();
                    if self.worker_count.load(Ordering::Acquire) == 0 {
                        let _ = self.try_spawn_worker(None, self.config.max_size);
                    }
                }
                return;
            }
        }

        self.worker_count.fetch_sub(1, Ordering::AcqRel);
        debug!(worker = %name, "worker stopped");
    }

    // A worker may leave only while the count stays at or above core size.
    fn try_retire(&self) -> bool {
        let mut count = self.worker_count.load(Ordering::Relaxed);
        loop {
            if count <= self.config.core_size {
                return false;
            }
            match self.worker_count.compare_exchange_weak(
                count,
                count - 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => count = actual,
            }
        }
    }

    fn notify_idle(&self) {
        if self.idle_workers.load(Ordering::Relaxed) > 0 {
            self.notify.notify_one();
        }
    }

    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            active_workers: self.worker_count.load(Ordering::Relaxed),
            idle_workers: self.idle_workers.load(Ordering::Relaxed),
            queued_tasks: self.queue.len(),
            total_submitted: self.total_submitted.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            rejected_tasks: self.rejected_tasks.load(Ordering::Relaxed),
            discarded_tasks: self.discarded_tasks.load(Ordering::Relaxed),
        }
    }

    /// Wait until every accepted task has finished or been dropped.
    pub async fn join_all(&self) {
        loop {
            let drained = self.drained.notified();
            if self.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            drained.await;
        }
    }

    pub async fn join_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.join_all()).await.is_ok()
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting tasks, let accepted work drain, then stop the workers.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.join_all().await;
        self.shutdown_token.cancel();
    }

    /// Like [`shutdown`](Self::shutdown) but gives up on draining after
    /// `timeout`; anything still queued at that point is dropped. Returns
    /// whether the drain completed.
    pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
        self.closed.store(true, Ordering::Release);
        let drained = self.join_all_timeout(timeout).await;
        self.shutdown_token.cancel();
        if !drained {
            self.drain_queue();
        }
        drained
    }

    /// Stop accepting tasks and drop everything still queued. Running tasks
    /// finish; their results stay observable through their handles.
    pub fn shutdown_now(&self) {
        self.closed.store(true, Ordering::Release);
        self.shutdown_token.cancel();
        self.drain_queue();
    }

    fn drain_queue(&self) {
        while let Some(task) = self.queue.pop() {
            self.discarded_tasks.fetch_add(1, Ordering::Relaxed);
            drop(task);
        }
    }

    /// Periodically hand a metrics snapshot to `callback` until the returned
    /// token is cancelled.
    pub fn start_monitoring<F>(self: &Arc<Self>, interval: Duration, callback: F) -> CancellationToken
    where
        F: Fn(PoolMetrics) + Send + 'static,
    {
        let pool = Arc::clone(self);
        let token = CancellationToken::new();
        let token_clone = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        callback(pool.metrics());
                    }
                    _ = token_clone.cancelled() => {
                        drop(pool);
                        break;
                    }
                }
            }
        });

        token
    }
}
