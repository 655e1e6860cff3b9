use super::{
    executor,
    pool::Shared,
    task::Task,
};
use std::sync::{
    atomic::Ordering,
    Arc,
};
use parking_lot::lock_api::RawMutex;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
};
use tracing::debug;


/// Место воркера в пуле. Закрытие `inbound` завершает цикл воркера.
pub(crate) struct WorkerSlot<T> {
    pub(crate) inbound: mpsc::Sender<Task<T>>,
    handle: JoinHandle<()>,
}

impl<T> WorkerSlot<T> {
    /// Закрывает входной канал и отдаёт handle цикла.
    pub(crate) fn close(self) -> JoinHandle<()> {
        drop(self.inbound);
        self.handle
    }
}

pub(crate) fn spawn<T, L>(shared: &Arc<Shared<T, L>>, index: usize) -> WorkerSlot<T>
where
    T: Send + 'static,
    L: RawMutex + Send + Sync + 'static,
{
    // ёмкость 1: воркер держит не больше одной ожидающей задачи
    let (inbound, receiver) = mpsc::channel(1);
    shared.live_workers.fetch_add(1, Ordering::AcqRel);
    let handle = tokio::spawn(run(Arc::clone(shared), index, receiver));
    WorkerSlot { inbound, handle }
}

async fn run<T, L>(shared: Arc<Shared<T, L>>, index: usize, mut receiver: mpsc::Receiver<Task<T>>)
where
    T: Send + 'static,
    L: RawMutex + Send + Sync + 'static,
{
    debug!(index, "worker started");
    while let Some(mut task) = receiver.recv().await {
        let outcome = executor::execute(&mut task, shared.policy).await;
        shared.deliver(outcome);
        shared.mark_idle(index);
    }
    shared.live_workers.fetch_sub(1, Ordering::AcqRel);
    debug!(index, "worker stopped");
}
