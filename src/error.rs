use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur within the `invoke_pool` pool.
#[derive(Error, Debug, Clone)]
pub enum PoolError {
  #[error("Pool is interrupted, task submission rejected")]
  TaskSubmissionRejected,

  #[error("Pool is interrupting or already stopped, cannot start a batch invocation")]
  PoolInterrupted,

  #[error("Task result is unavailable (not produced yet, or the task was cancelled)")]
  ResultUnavailable,

  #[error("Consumer expects {required} values but the task produced only {produced}")]
  ResultArityMismatch { required: usize, produced: usize },

  #[error("Result value at position {index} does not match the consumer's parameter type")]
  ResultTypeMismatch { index: usize },

  #[error("Last value of the task result is an error: {0}")]
  ResultIsError(Arc<dyn StdError + Send + Sync>),

  #[error("Submitted task panicked")]
  TaskPanicked,

  #[error("Failed to spawn pool thread: {0}")]
  ThreadSpawn(String),
}

impl PoolError {
  /// Returns `true` for every failure that means "the result could not be
  /// mapped": never produced, arity mismatch or type mismatch.
  pub fn is_result_unavailable(&self) -> bool {
    matches!(
      self,
      PoolError::ResultUnavailable | PoolError::ResultArityMismatch { .. } | PoolError::ResultTypeMismatch { .. }
    )
  }
}
