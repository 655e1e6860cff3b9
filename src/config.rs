use super::{
    availability::Strategy,
    errors::{PoolError, TaskError},
    result::PoolResult,
};
use std::{
    fmt,
    sync::Arc,
};
use tokio::time::Duration;


pub type ResultCallback<T> = Arc<dyn Fn(T) + Send + Sync + 'static>;
pub type ErrorCallback = Arc<dyn Fn(TaskError) + Send + Sync + 'static>;

/// Ёмкость очереди задач по умолчанию, на практике без ограничения.
pub const DEFAULT_TASK_QUEUE_SIZE: usize = 1_000_000;
pub const DEFAULT_ADJUST_INTERVAL: Duration = Duration::from_secs(1);

/// Конфигурация пула. После создания пула не меняется.
pub struct Config<T> {
    pub max_workers: usize,
    /// Нижняя граница автомасштабирования. `None` означает `max_workers`.
    pub min_workers: Option<usize>,
    pub task_queue_size: usize,
    /// Дополнительные попытки после первой ошибки.
    pub retry_count: usize,
    pub timeout: Option<Duration>,
    pub adjust_interval: Duration,
    pub strategy: Strategy,
    result_callback: Option<ResultCallback<T>>,
    error_callback: Option<ErrorCallback>,
}

impl<T> Config<T> {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers,
            min_workers: None,
            task_queue_size: DEFAULT_TASK_QUEUE_SIZE,
            retry_count: 0,
            timeout: None,
            adjust_interval: DEFAULT_ADJUST_INTERVAL,
            strategy: Strategy::default(),
            result_callback: None,
            error_callback: None,
        }
    }

    pub fn cpu_bound() -> Self {
        Self::new(num_cpus::get())
    }

    pub fn io_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self::new(num_cpus * 4).with_min_workers(num_cpus)
    }

    pub fn with_min_workers(mut self, min_workers: usize) -> Self {
        self.min_workers = Some(min_workers);
        self
    }

    /// Нулевая длительность отключает timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn with_result_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.result_callback = Some(Arc::new(callback));
        self
    }

    pub fn with_error_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(TaskError) + Send + Sync + 'static,
    {
        self.error_callback = Some(Arc::new(callback));
        self
    }

    pub fn with_retry_count(mut self, retry_count: usize) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_task_queue_size(mut self, size: usize) -> Self {
        self.task_queue_size = size;
        self
    }

    pub fn with_adjust_interval(mut self, interval: Duration) -> Self {
        self.adjust_interval = interval;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[inline]
    pub fn min_workers(&self) -> usize {
        self.min_workers.unwrap_or(self.max_workers)
    }

    pub(crate) fn result_callback(&self) -> Option<&ResultCallback<T>> {
        self.result_callback.as_ref()
    }

    pub(crate) fn error_callback(&self) -> Option<&ErrorCallback> {
        self.error_callback.as_ref()
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.max_workers == 0 {
            return Err(PoolError::InvalidConfig("max_workers must be positive".into()));
        }
        let min_workers = self.min_workers();
        // при нуле воркеров рост 0 * 2 никогда не сработает
        if min_workers == 0 {
            return Err(PoolError::InvalidConfig("min_workers must be positive".into()));
        }
        if min_workers > self.max_workers {
            return Err(PoolError::InvalidConfig(format!(
                "min_workers ({}) exceeds max_workers ({})",
                min_workers, self.max_workers
            )));
        }
        if self.task_queue_size == 0 {
            return Err(PoolError::InvalidConfig("task_queue_size must be positive".into()));
        }
        if self.adjust_interval.is_zero() {
            return Err(PoolError::InvalidConfig("adjust_interval must be positive".into()));
        }
        Ok(())
    }
}

impl<T> Default for Config<T> {
    fn default() -> Self {
        Self::new(num_cpus::get() * 2)
    }
}

impl<T> Clone for Config<T> {
    fn clone(&self) -> Self {
        Self {
            max_workers: self.max_workers,
            min_workers: self.min_workers,
            task_queue_size: self.task_queue_size,
            retry_count: self.retry_count,
            timeout: self.timeout,
            adjust_interval: self.adjust_interval,
            strategy: self.strategy,
            result_callback: self.result_callback.clone(),
            error_callback: self.error_callback.clone(),
        }
    }
}

impl<T> fmt::Debug for Config<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("max_workers", &self.max_workers)
            .field("min_workers", &self.min_workers())
            .field("task_queue_size", &self.task_queue_size)
            .field("retry_count", &self.retry_count)
            .field("timeout", &self.timeout)
            .field("adjust_interval", &self.adjust_interval)
            .field("strategy", &self.strategy)
            .field("result_callback", &self.result_callback.is_some())
            .field("error_callback", &self.error_callback.is_some())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_workers_defaults_to_max() {
        let config = Config::<()>::new(8);
        assert_eq!(config.min_workers(), 8);
        assert_eq!(config.task_queue_size, DEFAULT_TASK_QUEUE_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let config = Config::<()>::new(1).with_timeout(Duration::ZERO);
        assert_eq!(config.timeout, None);

        let config = config.with_timeout(Duration::from_millis(5));
        assert_eq!(config.timeout, Some(Duration::from_millis(5)));
    }

    #[test]
    fn rejects_invalid_bounds() {
        assert!(matches!(Config::<()>::new(0).validate(), Err(PoolError::InvalidConfig(_))));
        assert!(Config::<()>::new(4).with_min_workers(5).validate().is_err());
        assert!(Config::<()>::new(4).with_min_workers(0).validate().is_err());
        assert!(Config::<()>::new(4).with_task_queue_size(0).validate().is_err());
        assert!(Config::<()>::new(4).with_adjust_interval(Duration::ZERO).validate().is_err());
    }

    #[test]
    fn presets_are_valid() {
        assert!(Config::<()>::cpu_bound().validate().is_ok());
        assert!(Config::<()>::io_bound().validate().is_ok());
        assert!(Config::<()>::default().validate().is_ok());
    }
}
