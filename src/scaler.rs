use super::{
    model::Phase,
    pool::Shared,
    worker,
};
use std::sync::{
    atomic::Ordering,
    Arc,
};
use parking_lot::lock_api::RawMutex;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resize {
    Grow { from: usize, to: usize },
    Shrink { from: usize, to: usize },
}

/// Периодически подгоняет число воркеров под нагрузку, пока пул не начал освобождаться.
pub(crate) async fn run<T, L>(shared: Arc<Shared<T, L>>)
where
    T: Send + 'static,
    L: RawMutex + Send + Sync + 'static,
{
    let mut ticker = time::interval(shared.config.adjust_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // первый тик срабатывает сразу
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            _ = ticker.tick() => {
                match adjust(&shared) {
                    Some(Resize::Grow { from, to }) => info!(from, to, "pool grown"),
                    Some(Resize::Shrink { from, to }) => info!(from, to, "pool shrunk"),
                    None => continue,
                }
                shared.broadcast();
            }
        }
    }
    debug!("auto-scaler stopped");
}

pub(crate) fn adjust<T, L>(shared: &Arc<Shared<T, L>>) -> Option<Resize>
where
    T: Send + 'static,
    L: RawMutex + Send + Sync + 'static,
{
    let mut state = shared.state.lock();
    if state.phase != Phase::Running {
        return None;
    }

    let backlog = shared.queued.load(Ordering::Acquire);
    let current = state.workers.len();
    let max_workers = shared.config.max_workers;
    let min_workers = shared.config.min_workers();

    // backlog > 0.75 * current
    if backlog * 4 > current * 3 && current < max_workers {
        let target = (current * 2).min(max_workers);
        for index in current..target {
            let slot = worker::spawn(shared, index);
            state.workers.push(slot);
            state.idle.push(index);
        }
        Some(Resize::Grow { from: current, to: target })
    } else if backlog == 0 && state.idle.len() == current && current > min_workers {
        let target = current - (current - min_workers).div_ceil(2);
        let removed = state.shrink_to(target);
        state.retired.retain(|handle| !handle.is_finished());
        state.retired.extend(removed.into_iter().map(|slot| slot.close()));
        Some(Resize::Shrink { from: current, to: target })
    } else {
        None
    }
}
