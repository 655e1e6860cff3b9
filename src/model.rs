/// Стадия жизненного цикла пула.
///
/// `Running -> Draining -> Quiescing -> Terminated`, стадии не пропускаются.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    /// Очередь закрыта, диспетчер дорабатывает оставшиеся задачи.
    Draining,
    /// Ждём, пока все воркеры освободятся.
    Quiescing,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub workers: usize,
    pub idle_workers: usize,
    pub running: usize,
    pub queued_tasks: usize,
    pub live_workers: usize,
    pub total_submitted: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub phase: Phase,
}

impl PoolMetrics {
    pub fn utilization(&self) -> f64 {
        if self.workers == 0 {
            return 0.0;
        }
        self.running as f64 / self.workers as f64
    }

    /// Задач в очереди на одного воркера.
    pub fn queue_pressure(&self) -> f64 {
        if self.workers == 0 {
            return self.queued_tasks as f64;
        }
        self.queued_tasks as f64 / self.workers as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }
}
