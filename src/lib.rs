//! A fixed-size thread pool for batch invocation of heterogeneous callables,
//! with per-task lifecycle tracking, cooperative cancellation, batch
//! timeouts and graceful interruption.

mod error;
mod pool;
mod result;
mod runner;
mod task;
mod task_queue;
mod value;

pub use error::PoolError;
pub use pool::{PoolState, TaskPool};
pub use result::{Consumer, TaskResult};
pub use runner::Runner;
pub use task::{Callable, Nested, Task, TaskStatus, TaskToExecute};
pub use task_queue::TaskQueue;
pub use value::{FromValue, IntoValue, IntoValues, Value};

/// Creates and starts a pool with `worker_count` worker threads.
pub fn new(worker_count: usize) -> Result<TaskPool, PoolError> {
  TaskPool::new(worker_count)
}
