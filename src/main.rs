use surgepool::{Config, OverflowPolicy, Scheduler, WorkerPoolInner};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async {
        let pool = WorkerPoolInner::with_config(Config {
            core_size: 2,
            max_size: 4,
            queue_capacity: 8,
            overflow_policy: OverflowPolicy::CallerRuns,
            ..Default::default()
        });

        let done = Arc::new(AtomicUsize::new(0));
        for i in 0..32 {
            let done = done.clone();
            let handle = pool
                .submit(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    done.fetch_add(1, Ordering::Relaxed);
                    i * 2
                })
                .await;
            if let Err(err) = handle {
                eprintln!("submit {i} failed: {err}");
            }
        }

        let ticks = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(pool.clone());
        let tick_counter = ticks.clone();
        let heartbeat = scheduler.schedule_every(Duration::from_millis(100), move || {
            let ticks = tick_counter.clone();
            async move {
                ticks.fetch_add(1, Ordering::Relaxed);
            }
        });

        tokio::time::sleep(Duration::from_millis(550)).await;
        heartbeat.cancel();
        scheduler.shutdown();

        pool.shutdown().await;

        let metrics = pool.metrics();
        println!(
            "completed={} failed={} rejected={} discarded={} heartbeats={}",
            metrics.completed_tasks,
            metrics.failed_tasks,
            metrics.rejected_tasks,
            metrics.discarded_tasks,
            ticks.load(Ordering::Relaxed),
        );
    });
}
