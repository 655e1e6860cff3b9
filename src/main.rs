use elastic_pool::{Config, Pool, Task};
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};


#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "elastic_pool=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let now = Instant::now();
    let config = Config::io_bound()
        .with_adjust_interval(Duration::from_millis(100))
        .with_error_callback(|err| tracing::warn!(error = %err, "task failed"));
    let pool: Pool<u64> = Pool::with_config(config)?;

    let monitor = pool.start_monitoring(Duration::from_millis(250), |metrics| {
        tracing::info!(
            workers = metrics.workers,
            running = metrics.running,
            queued = metrics.queued_tasks,
            "pool metrics"
        );
    });

    for i in 0..10_000u64 {
        pool.add_task(Task::new(move || async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok::<_, anyhow::Error>(i)
        }))
        .await?;
    }

    pool.wait().await;
    monitor.cancel();
    pool.release().await;
    tracing::info!(elapsed = ?now.elapsed(), "done");
    Ok(())
}
