use super::{
    errors::TaskError,
    result::TaskResult,
    task::Task,
};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
};
use futures::FutureExt;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};


/// Правила выполнения одной задачи: число повторов и timeout попытки.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExecutionPolicy {
    pub retry_count: usize,
    pub timeout: Option<Duration>,
}

/// Выполняет задачу с повторами. Ошибка возвращается только после
/// `retry_count + 1` неудачных попыток, повтор идёт сразу, без backoff.
pub(crate) async fn execute<T: Send + 'static>(task: &mut Task<T>, policy: ExecutionPolicy) -> TaskResult<T> {
    let mut remaining = policy.retry_count;
    loop {
        let outcome = match policy.timeout {
            Some(limit) => attempt_with_timeout(task, limit).await,
            None => attempt(task).await,
        };

        match outcome {
            Err(err) if remaining > 0 => {
                remaining -= 1;
                debug!(error = %err, remaining, "task attempt failed, retrying");
            }
            other => return other,
        }
    }
}

async fn attempt<T: Send + 'static>(task: &mut Task<T>) -> TaskResult<T> {
    let fut = match panic::catch_unwind(AssertUnwindSafe(|| task.call(CancellationToken::new()))) {
        Ok(fut) => fut,
        Err(payload) => return Err(panicked(payload)),
    };

    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(res) => res.map_err(TaskError::Failed),
        Err(payload) => Err(panicked(payload)),
    }
}

// Тело уходит в отдельную задачу tokio. По истечении срока мы перестаём
// ждать, но сама задача продолжает работать в фоне.
async fn attempt_with_timeout<T: Send + 'static>(task: &mut Task<T>, limit: Duration) -> TaskResult<T> {
    let token = CancellationToken::new();
    let fut = match panic::catch_unwind(AssertUnwindSafe(|| task.call(token.clone()))) {
        Ok(fut) => fut,
        Err(payload) => return Err(panicked(payload)),
    };

    let handle = tokio::spawn(AssertUnwindSafe(fut).catch_unwind());
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(Ok(res))) => res.map_err(TaskError::Failed),
        Ok(Ok(Err(payload))) => Err(panicked(payload)),
        Ok(Err(join_err)) => {
            if join_err.is_panic() {
                Err(panicked(join_err.into_panic()))
            } else {
                Err(TaskError::JoinFailed(join_err.to_string()))
            }
        }
        Err(_) => {
            token.cancel();
            warn!(timeout = ?limit, "task attempt timed out");
            Err(TaskError::Timeout)
        }
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> TaskError {
    let message = panic_message(payload.as_ref());
    warn!(panic = %message, "task panicked");
    TaskError::Panic(message)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn policy(retry_count: usize, timeout: Option<Duration>) -> ExecutionPolicy {
        ExecutionPolicy { retry_count, timeout }
    }

    fn flaky(failures: usize, runs: Arc<AtomicUsize>) -> Task<usize> {
        Task::new(move || {
            let run = runs.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if run <= failures {
                    Err(anyhow::anyhow!("attempt {} failed", run))
                } else {
                    Ok(run)
                }
            }
        })
    }

    #[tokio::test]
    async fn succeeds_after_retries() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut task = flaky(2, runs.clone());

        let outcome = execute(&mut task, policy(3, None)).await;

        assert_eq!(outcome.unwrap(), 3);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_with_last_error() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut task = flaky(usize::MAX, runs.clone());

        let outcome = execute(&mut task, policy(2, None)).await;

        match outcome {
            Err(TaskError::Failed(err)) => assert_eq!(err.to_string(), "attempt 3 failed"),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn panic_in_body_is_captured() {
        let mut task: Task<()> = Task::new(|| async {
            if true {
                panic!("boom");
            }
            Ok::<_, anyhow::Error>(())
        });

        let outcome = execute(&mut task, policy(0, None)).await;

        match outcome {
            Err(TaskError::Panic(message)) => assert_eq!(message, "boom"),
            other => panic!("expected panic, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn panic_while_building_future_is_captured() {
        let mut task: Task<()> = Task::new(|| -> futures::future::Ready<anyhow::Result<()>> {
            panic!("eager boom")
        });

        let outcome = execute(&mut task, policy(0, Some(Duration::from_millis(50)))).await;

        assert!(matches!(outcome, Err(TaskError::Panic(ref m)) if m == "eager boom"));
    }

    #[tokio::test]
    async fn slow_attempt_times_out_and_cancels_token() {
        let cancelled = Arc::new(AtomicUsize::new(0));
        let flag = cancelled.clone();
        let mut task: Task<()> = Task::cancellable(move |token| {
            let flag = flag.clone();
            async move {
                tokio::select! {
                    _ = token.cancelled() => { flag.fetch_add(1, Ordering::SeqCst); }
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                }
                Ok::<_, anyhow::Error>(())
            }
        });

        let outcome = execute(&mut task, policy(0, Some(Duration::from_millis(20)))).await;
        assert!(outcome.unwrap_err().is_timeout());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeouts_count_toward_retries() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let mut task: Task<()> = Task::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, anyhow::Error>(())
            }
        });

        let outcome = execute(&mut task, policy(1, Some(Duration::from_millis(10)))).await;

        assert!(outcome.unwrap_err().is_timeout());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn blocking_body_runs_off_runtime() {
        let mut task = Task::blocking(|| {
            std::thread::sleep(Duration::from_millis(5));
            Ok::<_, anyhow::Error>(7)
        });

        assert_eq!(execute(&mut task, policy(0, None)).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn blocking_panic_is_captured() {
        let mut task: Task<()> = Task::blocking(|| -> anyhow::Result<()> { panic!("blocking boom") });

        let outcome = execute(&mut task, policy(0, None)).await;

        assert!(matches!(outcome, Err(TaskError::Panic(ref m)) if m == "blocking boom"));
    }
}
