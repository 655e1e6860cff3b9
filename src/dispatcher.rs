use super::{
    pool::Shared,
    task::Task,
};
use std::sync::{
    atomic::Ordering,
    Arc,
};
use parking_lot::lock_api::RawMutex;
use tokio::sync::mpsc;
use tracing::{debug, error};


/// Раздаёт задачи из общей очереди свободным воркерам в порядке поступления.
/// Завершается, когда очередь закрыта и пуста.
pub(crate) async fn run<T, L>(shared: Arc<Shared<T, L>>, mut queue: mpsc::Receiver<Task<T>>)
where
    T: Send + 'static,
    L: RawMutex + Send + Sync + 'static,
{
    while let Some(task) = queue.recv().await {
        shared.queued.fetch_sub(1, Ordering::AcqRel);

        let (index, inbound) = shared
            .wait_until(|state| {
                let index = state.idle.pop()?;
                Some((index, state.workers[index].inbound.clone()))
            })
            .await;

        // отправка вне лока: воркер сам берёт лок, когда освобождается
        if inbound.send(task).await.is_err() {
            error!(index, "worker inbound channel closed, task dropped");
            shared.finish_task();
        }
    }
    debug!("dispatcher stopped");
}
