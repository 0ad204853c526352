use crate::result::TaskResult;

use std::sync::Arc;
use std::time::Duration;

/// Lifecycle handle of one submitted unit of work.
pub trait Runner: Send + Sync {
  /// Returns the result if it has already been published. Never waits.
  fn get(&self) -> Option<Arc<TaskResult>>;

  /// Same peek as [`Runner::get`], bounded by `timeout`. A zero timeout is
  /// already expired and yields `None`.
  fn get_duration(&self, timeout: Duration) -> Option<Arc<TaskResult>>;

  fn is_done(&self) -> bool;

  fn is_running(&self) -> bool;

  /// Requests cooperative cancellation.
  ///
  /// Returns `true` if the task was already cancelled or the request was
  /// recorded, `false` if the task is running and can no longer be cancelled.
  fn cancel(&self) -> bool;

  fn is_cancelled(&self) -> bool;

  /// Executes the unit of work at most once.
  fn run(&self);
}
