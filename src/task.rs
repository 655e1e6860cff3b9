use std::{
    fmt,
    future::Future,
    sync::Arc,
};
use futures::{
    future::BoxFuture,
    FutureExt,
};
use tokio_util::sync::CancellationToken;


type Body<T> = Box<dyn FnMut(CancellationToken) -> BoxFuture<'static, anyhow::Result<T>> + Send + 'static>;

/// Единица работы для пула.
///
/// Тело задачи можно вызывать повторно: при ошибке пул перезапускает его,
/// пока не исчерпан `retry_count`.
pub struct Task<T> {
    body: Body<T>,
}

impl<T: Send + 'static> Task<T> {
    pub fn new<F, Fut, E>(mut f: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        Self::cancellable(move |_| f())
    }

    /// Тело получает токен, который отменяется, когда попытка упирается в timeout.
    /// Сама попытка при этом не прерывается, токен лишь сигнал.
    pub fn cancellable<F, Fut, E>(mut f: F) -> Self
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        Self {
            body: Box::new(move |token| {
                let fut = f(token);
                async move { fut.await.map_err(Into::into) }.boxed()
            }),
        }
    }

    /// Синхронное тело, выполняется в blocking-пуле tokio.
    pub fn blocking<F, E>(f: F) -> Self
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let f = Arc::new(f);
        Self::new(move || {
            let f = Arc::clone(&f);
            async move {
                match tokio::task::spawn_blocking(move || f()).await {
                    Ok(res) => res.map_err(Into::into),
                    // паника уходит наверх и ловится исполнителем
                    Err(join_err) if join_err.is_panic() => {
                        std::panic::resume_unwind(join_err.into_panic())
                    }
                    Err(join_err) => Err(anyhow::Error::new(join_err)),
                }
            }
        })
    }

    #[inline]
    pub(crate) fn call(&mut self, token: CancellationToken) -> BoxFuture<'static, anyhow::Result<T>> {
        (self.body)(token)
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}
