use super::pool::WorkerPool;
use std::{
    cmp::Ordering as CmpOrdering,
    collections::BinaryHeap,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};
use tokio::{
    sync::Notify,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Job = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> + Send + Sync>;

/// How a scheduled job repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    Once,
    /// Fixed-rate: fire times advance by the period from the previous fire
    /// time. A late wakeup reschedules from "now + period" instead of
    /// bursting to catch up.
    Every(Duration),
}

/// Handle to a scheduled entry. Cancelling prevents all future firings.
pub struct ScheduledHandle {
    cancel_token: CancellationToken,
}

impl ScheduledHandle {
    #[inline]
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

struct Entry {
    fire_at: Instant,
    seq: u64,
    rule: Recurrence,
    job: Job,
    cancel: CancellationToken,
}

// BinaryHeap is a max-heap; invert so the earliest fire time is on top, with
// the submission sequence breaking ties FIFO.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl Eq for Entry {}

/// Timer-driven scheduler that re-submits jobs to a [`WorkerPool`] at each
/// fire time. A separate concern from the pool itself: the scheduler decides
/// *when*, the pool decides *where* (and applies its own overflow policy to
/// fired jobs like to any other submission).
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    pool: WorkerPool,
    entries: Mutex<BinaryHeap<Entry>>,
    timer_notify: Notify,
    cancel: CancellationToken,
    seq: AtomicU64,
}

impl Scheduler {
    pub fn new(pool: WorkerPool) -> Scheduler {
        let inner = Arc::new(SchedulerInner {
            pool,
            entries: Mutex::new(BinaryHeap::new()),
            timer_notify: Notify::new(),
            cancel: CancellationToken::new(),
            seq: AtomicU64::new(0),
        });

        let runner = inner.clone();
        tokio::spawn(async move {
            runner.run().await;
        });

        Scheduler { inner }
    }

    /// Register a job to fire after `initial_delay` and repeat per `rule`.
    /// Jobs are explicit function values producing a fresh future per firing.
    pub fn schedule<F, Fut>(
        &self,
        initial_delay: Duration,
        rule: Recurrence,
        job: F,
    ) -> ScheduledHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job: Job = Arc::new(move || Box::pin(job()));
        let cancel = CancellationToken::new();
        let entry = Entry {
            fire_at: Instant::now() + initial_delay,
            seq: self.inner.seq.fetch_add(1, Ordering::Relaxed),
            rule,
            job,
            cancel: cancel.clone(),
        };

        debug!(seq = entry.seq, ?rule, "entry scheduled");
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        // The new entry may be earlier than the deadline the timer sleeps on.
        self.inner.timer_notify.notify_one();

        ScheduledHandle { cancel_token: cancel }
    }

    pub fn schedule_once<F, Fut>(&self, delay: Duration, job: F) -> ScheduledHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.schedule(delay, Recurrence::Once, job)
    }

    pub fn schedule_every<F, Fut>(&self, period: Duration, job: F) -> ScheduledHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.schedule(period, Recurrence::Every(period), job)
    }

    /// Stop the timer. Already-fired jobs keep running in the pool.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

impl SchedulerInner {
    async fn run(self: Arc<Self>) {
        debug!("scheduler timer started");

        loop {
            let now = Instant::now();
            let due = {
                let mut entries = self
                    .entries
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let mut due = Vec::new();
                while entries.peek().map_or(false, |e| e.fire_at <= now) {
                    if let Some(entry) = entries.pop() {
                        due.push(entry);
                    }
                }
                due
            };

            for mut entry in due {
                if entry.cancel.is_cancelled() {
                    debug!(seq = entry.seq, "dropping cancelled entry");
                    continue;
                }

                let fut = (entry.job)();
                if let Err(err) = self.pool.submit(fut).await {
                    warn!(seq = entry.seq, %err, "could not hand fired job to the pool");
                }

                if let Recurrence::Every(period) = entry.rule {
                    entry.fire_at += period;
                    if entry.fire_at <= now {
                        entry.fire_at = now + period;
                    }
                    self.entries
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(entry);
                }
            }

            // Recomputed after re-pushing recurring entries so the next
            // period never oversleeps.
            let next_deadline = self
                .entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .peek()
                .map(|e| e.fire_at);

            let wakeup = self.timer_notify.notified();
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = wakeup => {}
                _ = sleep_until_deadline(next_deadline) => {}
            }
        }

        debug!("scheduler timer stopped");
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
