use super::{
    availability::Availability,
    config::Config,
    dispatcher,
    errors::PoolError,
    executor::{self, ExecutionPolicy},
    lock::DefaultLock,
    model::{Phase, PoolMetrics},
    result::{PoolResult, TaskResult},
    scaler,
    task::Task,
    worker::{self, WorkerSlot},
};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use futures::{
    future::{self, BoxFuture},
    FutureExt,
};
use parking_lot::lock_api::{self, RawMutex};
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};


/// Всё, что защищено локом пула: воркеры, свободные индексы и вход очереди.
pub(crate) struct PoolState<T> {
    pub(crate) workers: Vec<WorkerSlot<T>>,
    pub(crate) idle: Box<dyn Availability>,
    pub(crate) queue: Option<mpsc::Sender<Task<T>>>,
    pub(crate) phase: Phase,
    /// Циклы воркеров, убранных при сжатии. Release дожидается их завершения.
    pub(crate) retired: Vec<JoinHandle<()>>,
}

impl<T> PoolState<T> {
    /// Оставляет воркеров `[0, target)`. Вызывается, только когда все воркеры свободны.
    pub(crate) fn shrink_to(&mut self, target: usize) -> Vec<WorkerSlot<T>> {
        if target >= self.workers.len() {
            return Vec::new();
        }
        self.idle.truncate(target);
        self.workers.split_off(target)
    }
}

pub(crate) struct Shared<T, L: RawMutex> {
    pub(crate) state: lock_api::Mutex<L, PoolState<T>>,
    /// Условная переменная поверх `state`: будит всех, кто ждёт смены состояния.
    changed: Notify,
    pub(crate) config: Config<T>,
    pub(crate) policy: ExecutionPolicy,
    /// Отменяется в release, останавливает автомасштабирование и мониторинг.
    pub(crate) shutdown: CancellationToken,
    /// Принятые, но ещё не выданные воркерам задачи.
    pub(crate) queued: AtomicUsize,
    /// Принятые задачи, по которым ещё не вызван callback.
    pending: AtomicUsize,
    pub(crate) live_workers: AtomicUsize,
    total_submitted: AtomicUsize,
    completed_tasks: AtomicUsize,
    failed_tasks: AtomicUsize,
}

impl<T, L> Shared<T, L>
where
    T: Send + 'static,
    L: RawMutex + Send + Sync + 'static,
{
    pub(crate) fn new(config: Config<T>, queue: mpsc::Sender<Task<T>>) -> Self {
        let min_workers = config.min_workers();
        let state = PoolState {
            workers: Vec::with_capacity(min_workers),
            idle: config.strategy.build(config.max_workers),
            queue: Some(queue),
            phase: Phase::Running,
            retired: Vec::new(),
        };
        Self {
            state: lock_api::Mutex::new(state),
            changed: Notify::new(),
            policy: ExecutionPolicy {
                retry_count: config.retry_count,
                timeout: config.timeout,
            },
            config,
            shutdown: CancellationToken::new(),
            queued: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
            live_workers: AtomicUsize::new(0),
            total_submitted: AtomicUsize::new(0),
            completed_tasks: AtomicUsize::new(0),
            failed_tasks: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub(crate) fn broadcast(&self) {
        self.changed.notify_waiters();
    }

    /// Ждёт, пока `check` под локом не вернёт значение.
    ///
    /// Подписка на `changed` оформляется до проверки, поэтому сигнал,
    /// пришедший между проверкой и ожиданием, не теряется.
    pub(crate) async fn wait_until<R, F>(&self, mut check: F) -> R
    where
        F: FnMut(&mut PoolState<T>) -> Option<R>,
    {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(value) = check(&mut state) {
                    return value;
                }
            }

            notified.await;
        }
    }

    fn queue_sender(&self) -> PoolResult<mpsc::Sender<Task<T>>> {
        self.state.lock().queue.clone().ok_or(PoolError::Closed)
    }

    fn begin_task(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.queued.fetch_add(1, Ordering::AcqRel);
        self.total_submitted.fetch_add(1, Ordering::Relaxed);
    }

    fn abandon_task(&self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
        self.total_submitted.fetch_sub(1, Ordering::Relaxed);
        self.finish_task();
    }

    pub(crate) fn finish_task(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.broadcast();
        }
    }

    /// Отдаёт результат ровно одному из callback'ов. Паника в callback не роняет воркер.
    pub(crate) fn deliver(&self, outcome: TaskResult<T>) {
        match outcome {
            Ok(value) => {
                self.completed_tasks.fetch_add(1, Ordering::Relaxed);
                if let Some(callback) = self.config.result_callback() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(value))) {
                        error!(panic = %executor::panic_message(payload.as_ref()), "result callback panicked");
                    }
                }
            }
            Err(err) => {
                self.failed_tasks.fetch_add(1, Ordering::Relaxed);
                if let Some(callback) = self.config.error_callback() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(err))) {
                        error!(panic = %executor::panic_message(payload.as_ref()), "error callback panicked");
                    }
                }
            }
        }
    }

    /// Возвращает воркера в множество свободных и будит ожидающих.
    pub(crate) fn mark_idle(&self, index: usize) {
        {
            let mut state = self.state.lock();
            // после аварийного drop пула слоты уже очищены
            if state.phase != Phase::Terminated && index < state.workers.len() {
                state.idle.push(index);
            }
        }
        self.pending.fetch_sub(1, Ordering::AcqRel);
        self.broadcast();
    }

    pub(crate) fn metrics(&self) -> PoolMetrics {
        let state = self.state.lock();
        let workers = state.workers.len();
        let idle_workers = state.idle.len();
        PoolMetrics {
            workers,
            idle_workers,
            running: workers - idle_workers,
            queued_tasks: self.queued.load(Ordering::Relaxed),
            live_workers: self.live_workers.load(Ordering::Relaxed),
            total_submitted: self.total_submitted.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            phase: state.phase,
        }
    }
}

struct Background {
    dispatcher: Option<JoinHandle<()>>,
    scaler: Option<JoinHandle<()>>,
    /// Общая для всех вызовов release задача освобождения.
    release: Option<future::Shared<BoxFuture<'static, ()>>>,
}

/// Эластичный пул воркеров.
///
/// Задачи проходят через ограниченную очередь, диспетчер отдаёт их свободным
/// воркерам, автомасштабирование держит число воркеров в
/// `[min_workers, max_workers]`. Результаты и ошибки приходят только в callback'и.
///
/// Пул создаётся внутри рантайма tokio. Лок, под которым живут воркеры и
/// множество свободных, задаётся параметром `L`.
pub struct Pool<T, L: RawMutex = DefaultLock> {
    shared: Arc<Shared<T, L>>,
    background: parking_lot::Mutex<Background>,
}

impl<T: Send + 'static> Pool<T> {
    pub fn new(max_workers: usize) -> PoolResult<Self> {
        Self::with_config(Config::new(max_workers))
    }

    pub fn with_config(config: Config<T>) -> PoolResult<Self> {
        Self::with_custom_lock(config)
    }
}

impl<T, L> Pool<T, L>
where
    T: Send + 'static,
    L: RawMutex + Send + Sync + 'static,
{
    /// Как [`Pool::with_config`], но с указанным локом, например `Pool::<u64, SpinLock>::with_custom_lock(config)`.
    pub fn with_custom_lock(config: Config<T>) -> PoolResult<Self> {
        config.validate()?;

        let min_workers = config.min_workers();
        let (queue, queue_rx) = mpsc::channel(config.task_queue_size);
        let shared = Arc::new(Shared::new(config, queue));

        {
            let mut state = shared.state.lock();
            for index in 0..min_workers {
                let slot = worker::spawn(&shared, index);
                state.workers.push(slot);
                state.idle.push(index);
            }
        }

        let background = Background {
            dispatcher: Some(tokio::spawn(dispatcher::run(Arc::clone(&shared), queue_rx))),
            scaler: Some(tokio::spawn(scaler::run(Arc::clone(&shared)))),
            release: None,
        };

        info!(
            min_workers,
            max_workers = shared.config.max_workers,
            strategy = ?shared.config.strategy,
            "pool started"
        );

        Ok(Self {
            shared,
            background: parking_lot::Mutex::new(background),
        })
    }

    /// Ставит задачу в очередь, ожидая места, если очередь заполнена.
    pub async fn add_task(&self, task: Task<T>) -> PoolResult<()> {
        let queue = self.shared.queue_sender()?;
        self.shared.begin_task();
        if queue.send(task).await.is_err() {
            self.shared.abandon_task();
            return Err(PoolError::Closed);
        }
        Ok(())
    }

    pub fn try_add_task(&self, task: Task<T>) -> PoolResult<()> {
        let queue = self.shared.queue_sender()?;
        self.shared.begin_task();
        match queue.try_send(task) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.shared.abandon_task();
                match err {
                    mpsc::error::TrySendError::Full(_) => Err(PoolError::QueueFull),
                    mpsc::error::TrySendError::Closed(_) => Err(PoolError::Closed),
                }
            }
        }
    }

    /// Ждёт, пока все принятые задачи не будут выполнены и все воркеры не освободятся.
    ///
    /// Задачи, добавленные параллельно с `wait`, могут попасть или не попасть в ожидание.
    pub async fn wait(&self) {
        let shared = &self.shared;
        shared
            .wait_until(|state| {
                let settled = shared.pending.load(Ordering::Acquire) == 0
                    && state.idle.len() == state.workers.len();
                settled.then_some(())
            })
            .await
    }

    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }

    /// Закрывает очередь, дорабатывает принятые задачи, сжимает пул до
    /// `min_workers` и завершает всех воркеров.
    ///
    /// Сама последовательность выполняется в отдельной задаче tokio, поэтому
    /// брошенный на полпути вызов (timeout, `select!`) её не прерывает.
    /// Повторные вызовы ждут ту же задачу.
    pub async fn release(&self) {
        let release = {
            let mut background = self.background.lock();
            match background.release.clone() {
                Some(release) => release,
                None => {
                    {
                        let mut state = self.shared.state.lock();
                        if state.phase == Phase::Running {
                            state.phase = Phase::Draining;
                            state.queue = None;
                        }
                    }
                    info!("releasing pool");
                    let handle = tokio::spawn(shutdown(
                        Arc::clone(&self.shared),
                        background.dispatcher.take(),
                        background.scaler.take(),
                    ));
                    let release = join("release", handle).boxed().shared();
                    background.release = Some(release.clone());
                    release
                }
            }
        };
        release.await;
    }

    /// Число воркеров, занятых задачей.
    pub fn running(&self) -> usize {
        let state = self.shared.state.lock();
        state.workers.len() - state.idle.len()
    }

    pub fn worker_count(&self) -> usize {
        self.shared.state.lock().workers.len()
    }

    pub fn idle_workers(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    pub fn task_queue_size(&self) -> usize {
        self.shared.config.task_queue_size
    }

    /// Задачи, принятые в очередь и ещё не выданные воркерам.
    pub fn backlog(&self) -> usize {
        self.shared.queued.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.lock().phase
    }

    pub fn config(&self) -> &Config<T> {
        &self.shared.config
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        self.shared.metrics()
    }

    /// Мониторинг метрик с callback.
    /// Останавливается при release пула или при отмене возвращённого токена.
    pub fn start_monitoring<F>(&self, interval: Duration, callback: F) -> CancellationToken
    where
        F: Fn(PoolMetrics) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let token = self.shared.shutdown.child_token();
        let token_clone = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        callback(shared.metrics());
                    }
                    _ = token_clone.cancelled() => {
                        drop(shared);
                        break;
                    }
                }
            }
        });

        token
    }
}

async fn shutdown<T, L>(
    shared: Arc<Shared<T, L>>,
    dispatcher: Option<JoinHandle<()>>,
    scaler: Option<JoinHandle<()>>,
) where
    T: Send + 'static,
    L: RawMutex + Send + Sync + 'static,
{
    shared.shutdown.cancel();
    if let Some(handle) = scaler {
        join("auto-scaler", handle).await;
    }
    if let Some(handle) = dispatcher {
        join("dispatcher", handle).await;
    }

    {
        let mut state = shared.state.lock();
        if state.phase == Phase::Draining {
            state.phase = Phase::Quiescing;
        }
    }
    shared.broadcast();

    let min_workers = shared.config.min_workers();
    let (workers, retired) = shared
        .wait_until(|state| {
            // пул мог быть брошен через drop, пока шло освобождение
            if state.phase == Phase::Terminated {
                return Some((Vec::new(), std::mem::take(&mut state.retired)));
            }
            if state.idle.len() != state.workers.len() {
                return None;
            }
            let mut removed = state.shrink_to(min_workers);
            debug!(removed = removed.len(), min_workers, "pool settled");
            removed.append(&mut state.workers);
            state.idle.clear();
            state.phase = Phase::Terminated;
            Some((removed, std::mem::take(&mut state.retired)))
        })
        .await;
    shared.broadcast();

    let handles: Vec<_> = workers.into_iter().map(WorkerSlot::close).collect();
    for handle in handles.into_iter().chain(retired) {
        join("worker", handle).await;
    }
    info!("pool released");
}

async fn join(name: &'static str, handle: JoinHandle<()>) {
    if let Err(err) = handle.await {
        if !err.is_cancelled() {
            error!(error = %err, "{} terminated abnormally", name);
        }
    }
}

// Пул, брошенный без release: фоновые циклы прерываются, каналы воркеров
// закрываются, занятые воркеры доделывают текущую задачу и выходят.
impl<T, L: RawMutex> Drop for Pool<T, L> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            if state.phase == Phase::Terminated {
                return;
            }
            state.phase = Phase::Terminated;
            state.queue = None;
            state.workers.clear();
            state.idle.clear();
            state.retired.clear();
        }
        self.shared.shutdown.cancel();
        let mut background = self.background.lock();
        for handle in [background.dispatcher.take(), background.scaler.take()].into_iter().flatten() {
            handle.abort();
        }
        self.shared.changed.notify_waiters();
        debug!("pool dropped without release");
    }
}
