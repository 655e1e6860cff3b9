use super::errors::{PoolError, TaskError};

pub type TaskResult<T> = Result<T, TaskError>;

pub type PoolResult<T> = Result<T, PoolError>;
