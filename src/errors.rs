use thiserror::Error;

/// Terminal outcome of a task that did not produce a value.
///
/// Delivered only through the pool's error callback.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Failed(anyhow::Error),

    #[error("task panicked: {0}")]
    Panic(String),

    #[error("task timed out")]
    Timeout,

    /// The spawned attempt of a task with a timeout was cancelled before it
    /// finished. Only reachable when the runtime shuts down while the pool
    /// is still joining that attempt.
    #[error("task join failed: {0}")]
    JoinFailed(String),
}

impl TaskError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout)
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panic(_))
    }
}

/// Misuse of the pool itself, as opposed to a failing task.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("pool is closed")]
    Closed,

    #[error("task queue is full")]
    QueueFull,
}
