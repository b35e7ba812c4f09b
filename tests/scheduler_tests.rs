#[cfg(test)]
mod tests {
    use surgepool::{Recurrence, Scheduler, WorkerPoolInner};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };
    use tokio::time::Duration;

    fn counter_job(
        counter: &Arc<AtomicUsize>,
    ) -> impl Fn() -> futures::future::BoxFuture<'static, ()> + Send + Sync + 'static {
        let counter = counter.clone();
        move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test]
    async fn once_fires_after_its_delay_and_only_once() {
        let pool = WorkerPoolInner::new(2, 2, 16);
        let scheduler = Scheduler::new(pool.clone());
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.schedule_once(Duration::from_millis(80), counter_job(&fired));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0, "must not fire early");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1, "Once must not repeat");

        scheduler.shutdown();
        println!("✓ one-shot entry fired exactly once");
    }

    #[tokio::test]
    async fn fixed_rate_entry_keeps_firing() {
        let pool = WorkerPoolInner::new(2, 2, 16);
        let scheduler = Scheduler::new(pool.clone());
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(
            Duration::from_millis(10),
            Recurrence::Every(Duration::from_millis(50)),
            counter_job(&fired),
        );

        tokio::time::sleep(Duration::from_millis(400)).await;
        let count = fired.load(Ordering::SeqCst);
        assert!(count >= 3, "expected at least 3 firings, saw {}", count);
        assert!(count <= 10, "fired implausibly often: {}", count);

        scheduler.shutdown();
        println!("✓ fixed-rate entry fired {} times in 400ms", count);
    }

    #[tokio::test]
    async fn earlier_entry_fires_first() {
        let pool = WorkerPoolInner::new(2, 2, 16);
        let scheduler = Scheduler::new(pool.clone());
        let order = Arc::new(Mutex::new(Vec::new()));

        let record = |tag: &'static str| {
            let order = order.clone();
            move || {
                let order = order.clone();
                async move {
                    order.lock().unwrap().push(tag);
                }
            }
        };

        scheduler.schedule_once(Duration::from_millis(120), record("late"));
        scheduler.schedule_once(Duration::from_millis(40), record("early"));

        tokio::time::sleep(Duration::from_millis(300)).await;
        pool.join_all().await;

        assert_eq!(*order.lock().unwrap(), vec!["early", "late"]);
        scheduler.shutdown();
        println!("✓ entries fired in deadline order, not submission order");
    }

    #[tokio::test]
    async fn cancelled_entry_stops_firing() {
        let pool = WorkerPoolInner::new(2, 2, 16);
        let scheduler = Scheduler::new(pool.clone());
        let fired = Arc::new(AtomicUsize::new(0));

        let handle = scheduler.schedule(
            Duration::from_millis(10),
            Recurrence::Every(Duration::from_millis(30)),
            counter_job(&fired),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
        assert!(handle.is_cancelled());

        // Let any in-flight firing settle before taking the snapshot.
        tokio::time::sleep(Duration::from_millis(60)).await;
        let snapshot = fired.load(Ordering::SeqCst);
        assert!(snapshot >= 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            fired.load(Ordering::SeqCst),
            snapshot,
            "no firings may happen after cancel"
        );

        scheduler.shutdown();
        println!("✓ cancelled entry went quiet after {} firings", snapshot);
    }

    #[tokio::test]
    async fn scheduler_shutdown_stops_the_timer() {
        let pool = WorkerPoolInner::new(2, 2, 16);
        let scheduler = Scheduler::new(pool.clone());
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(
            Duration::from_millis(10),
            Recurrence::Every(Duration::from_millis(30)),
            counter_job(&fired),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.shutdown();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let snapshot = fired.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), snapshot);
        println!("✓ timer stopped; count held at {}", snapshot);
    }

    #[tokio::test]
    async fn fired_jobs_go_through_the_pool() {
        let pool = WorkerPoolInner::new(2, 2, 16);
        let scheduler = Scheduler::new(pool.clone());
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            scheduler.schedule_once(Duration::from_millis(20), counter_job(&fired));
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        pool.join_all().await;

        assert_eq!(fired.load(Ordering::SeqCst), 5);
        let metrics = pool.metrics();
        assert!(
            metrics.completed_tasks >= 5,
            "fired jobs must be accounted as pool tasks"
        );
        scheduler.shutdown();
        println!("✓ {} fired jobs executed as pool tasks", 5);
    }
}
