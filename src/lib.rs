//! Эластичный пул воркеров поверх tokio
//!
//! # Features
//! - Ограниченная очередь задач с backpressure
//! - Автомасштабирование в пределах `[min_workers, max_workers]`
//! - Выбор воркера: стек (последний освободившийся) или кольцо (по кругу)
//! - Повторы, timeout попытки, перехват паник
//! - Результаты и ошибки через callback'и
//! - Подключаемый лок (`parking_lot` по умолчанию, [`SpinLock`] как альтернатива)
//!
//! ```no_run
//! use elastic_pool::{Config, Pool, Task};
//!
//! # async fn demo() -> Result<(), elastic_pool::PoolError> {
//! let config = Config::new(8)
//!     .with_min_workers(2)
//!     .with_result_callback(|n: u64| println!("done: {}", n));
//! let pool = Pool::with_config(config)?;
//!
//! for i in 0..100u64 {
//!     pool.add_task(Task::new(move || async move { Ok::<_, anyhow::Error>(i * i) })).await?;
//! }
//! pool.wait().await;
//! pool.release().await;
//! # Ok(())
//! # }
//! ```

pub mod availability;
pub mod config;
mod dispatcher;
pub mod errors;
mod executor;
pub mod lock;
pub mod model;
pub mod pool;
pub mod result;
mod scaler;
pub mod task;
mod worker;

pub use availability::{Availability, IdleRing, IdleStack, Strategy};
pub use config::Config;
pub use errors::{PoolError, TaskError};
pub use lock::{DefaultLock, SpinLock};
pub use model::{Phase, PoolMetrics};
pub use pool::Pool;
pub use task::Task;
