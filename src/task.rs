use crate::error::PoolError;
use crate::result::{Consumer, TaskResult};
use crate::runner::Runner;
use crate::value::{IntoValues, Value};

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace};

lazy_static::lazy_static! {
  static ref NEXT_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// A zero-argument unit of work that can be handed to the pool.
///
/// Every `FnOnce() -> R + Send + 'static` closure is a `Callable` as long as
/// `R` implements [`IntoValues`]; a [`Nested`] runner is one too.
pub trait Callable: Send + 'static {
  fn call(self: Box<Self>) -> Vec<Value>;

  fn boxed(self) -> TaskToExecute
  where
    Self: Sized,
  {
    Box::new(self)
  }
}

/// The type of callable the pool executes.
pub type TaskToExecute = Box<dyn Callable>;

impl<F, R> Callable for F
where
  F: FnOnce() -> R + Send + 'static,
  R: IntoValues,
{
  fn call(self: Box<Self>) -> Vec<Value> {
    (*self)().into_values()
  }
}

/// Runs another runner as the body of a task. Produces no values.
pub struct Nested<R: Runner + ?Sized>(pub Arc<R>);

impl<R: Runner + ?Sized + 'static> Callable for Nested<R> {
  fn call(self: Box<Self>) -> Vec<Value> {
    self.0.run();
    Vec::new()
  }
}

/// Status of a task. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskStatus {
  #[default]
  Created,
  Running,
  Done,
}

#[derive(Debug)]
struct CancelSignal;

struct TaskState {
  status: TaskStatus,
  cancelled: bool,
  callable: Option<TaskToExecute>,
  result: Option<Arc<TaskResult>>,
}

impl TaskState {
  fn is_terminal(&self) -> bool {
    self.cancelled || self.status == TaskStatus::Done
  }
}

/// One submitted callable together with its lifecycle state.
///
/// Cancellation is cooperative: [`Runner::cancel`] only leaves a marker that
/// [`Runner::run`] consumes right before invoking the callable. Once the
/// callable has started it always runs to completion.
pub struct Task {
  task_id: u64,
  state: Mutex<TaskState>,
  terminal: Condvar,
  cancel_tx: Sender<CancelSignal>,
  cancel_rx: Receiver<CancelSignal>,
}

impl Task {
  pub fn new(callable: TaskToExecute) -> Self {
    let (cancel_tx, cancel_rx) = bounded(1);
    Self {
      task_id: NEXT_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed),
      state: Mutex::new(TaskState {
        status: TaskStatus::Created,
        cancelled: false,
        callable: Some(callable),
        result: None,
      }),
      terminal: Condvar::new(),
      cancel_tx,
      cancel_rx,
    }
  }

  /// Returns the unique ID of this task.
  pub fn id(&self) -> u64 {
    self.task_id
  }

  pub fn status(&self) -> TaskStatus {
    self.state.lock().status
  }

  /// Returns the published result.
  ///
  /// # Errors
  /// Returns `PoolError::ResultUnavailable` if the task has not produced a
  /// result yet or was cancelled.
  pub fn result(&self) -> Result<Arc<TaskResult>, PoolError> {
    self.get().ok_or(PoolError::ResultUnavailable)
  }

  /// Unpacks the published result into `consumer`, see [`TaskResult::map_v`].
  pub fn map_v<Args, C: Consumer<Args>>(&self, consumer: C) -> Result<(), PoolError> {
    self.result()?.map_v(consumer)
  }

  /// Blocks until the task is done or cancelled. `None` waits without bound.
  ///
  /// Returns `false` if the timeout elapsed first.
  pub fn wait(&self, timeout: Option<Duration>) -> bool {
    self.wait_until(timeout.map(|timeout| Instant::now() + timeout))
  }

  pub(crate) fn wait_until(&self, deadline: Option<Instant>) -> bool {
    let mut state = self.state.lock();
    while !state.is_terminal() {
      match deadline {
        Some(deadline) => {
          if self.terminal.wait_until(&mut state, deadline).timed_out() {
            return state.is_terminal();
          }
        }
        None => self.terminal.wait(&mut state),
      }
    }
    true
  }

  /// Records a cancellation for a task whose batch deadline passed.
  ///
  /// Unlike [`Runner::cancel`] this also applies to a running task: the
  /// callable keeps going but the task reports cancelled. Returns `false` if
  /// the task was already done.
  pub(crate) fn expire(&self) -> bool {
    let mut state = self.state.lock();
    if state.status == TaskStatus::Done {
      return false;
    }
    if !state.cancelled {
      state.cancelled = true;
      self.terminal.notify_all();
      debug!(task_id = self.task_id, status = ?state.status, "Task expired, marked cancelled.");
    }
    true
  }
}

impl Runner for Task {
  fn get(&self) -> Option<Arc<TaskResult>> {
    let state = self.state.lock();
    if state.cancelled {
      return None;
    }
    state.result.clone()
  }

  fn get_duration(&self, timeout: Duration) -> Option<Arc<TaskResult>> {
    if timeout.is_zero() {
      return None;
    }
    self.get()
  }

  fn is_done(&self) -> bool {
    self.status() == TaskStatus::Done
  }

  fn is_running(&self) -> bool {
    self.status() == TaskStatus::Running
  }

  fn cancel(&self) -> bool {
    let state = self.state.lock();
    if state.cancelled {
      return true;
    }
    if state.status == TaskStatus::Running {
      trace!(task_id = self.task_id, "Cancel rejected, task already running.");
      return false;
    }
    match self.cancel_tx.try_send(CancelSignal) {
      Ok(()) => trace!(task_id = self.task_id, "Cancellation marker posted."),
      Err(TrySendError::Full(_)) => trace!(task_id = self.task_id, "Cancellation marker already pending."),
      Err(TrySendError::Disconnected(_)) => {}
    }
    true
  }

  fn is_cancelled(&self) -> bool {
    self.state.lock().cancelled
  }

  fn run(&self) {
    let callable = {
      let mut state = self.state.lock();
      if state.cancelled || state.status != TaskStatus::Created {
        return;
      }
      if self.cancel_rx.try_recv().is_ok() {
        state.cancelled = true;
        self.terminal.notify_all();
        debug!(task_id = self.task_id, "Task cancelled before invocation, callable skipped.");
        return;
      }
      let Some(callable) = state.callable.take() else {
        return;
      };
      state.status = TaskStatus::Running;
      callable
    };

    trace!(task_id = self.task_id, "Invoking task callable.");
    let values = match panic::catch_unwind(AssertUnwindSafe(move || callable.call())) {
      Ok(values) => values,
      Err(_panic_payload) => {
        error!(task_id = self.task_id, "Task panicked during execution.");
        vec![Value::error(PoolError::TaskPanicked)]
      }
    };

    let mut state = self.state.lock();
    state.result = Some(Arc::new(TaskResult::new(values)));
    state.status = TaskStatus::Done;
    self.terminal.notify_all();
    trace!(task_id = self.task_id, "Task done, result published.");
  }
}

impl fmt::Debug for Task {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("Task")
      .field("task_id", &self.task_id)
      .field("status", &state.status)
      .field("cancelled", &state.cancelled)
      .field("has_result", &state.result.is_some())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;
  use std::thread;

  fn counting_task(counter: Arc<AtomicUsize>) -> Task {
    Task::new(
      (move || {
        counter.fetch_add(1, AtomicOrdering::SeqCst);
        (42i32, None::<PoolError>)
      })
      .boxed(),
    )
  }

  // Callable that reports when it starts and then waits to be released.
  fn gated_task() -> (Task, Receiver<()>, Sender<()>) {
    let (started_tx, started_rx) = bounded(1);
    let (release_tx, release_rx) = bounded::<()>(1);
    let task = Task::new(
      (move || {
        let _ = started_tx.send(());
        let _ = release_rx.recv();
        "released"
      })
      .boxed(),
    );
    (task, started_rx, release_tx)
  }

  #[test]
  fn run_invokes_callable_once_and_publishes_result() {
    let counter = Arc::new(AtomicUsize::new(0));
    let task = counting_task(counter.clone());
    assert_eq!(task.status(), TaskStatus::Created);
    assert!(!task.is_running() && !task.is_done());
    assert!(task.get().is_none());

    task.run();
    task.run();

    assert_eq!(counter.load(AtomicOrdering::SeqCst), 1);
    assert!(task.is_done());
    assert!(!task.is_running());
    let result = task.get().expect("result should be published");
    assert_eq!(result.len(), 2);
    let mut seen = 0;
    task.map_v(|v: i32| seen = v).unwrap();
    assert_eq!(seen, 42);
  }

  #[test]
  fn cancel_before_run_skips_callable() {
    let counter = Arc::new(AtomicUsize::new(0));
    let task = counting_task(counter.clone());

    assert!(task.cancel());
    // The marker is only consumed by run.
    assert!(!task.is_cancelled());
    assert!(task.cancel());

    task.run();
    assert_eq!(counter.load(AtomicOrdering::SeqCst), 0);
    assert!(task.is_cancelled());
    assert!(!task.is_done());
    assert!(task.cancel());
    assert!(matches!(task.result(), Err(PoolError::ResultUnavailable)));
  }

  #[test]
  fn cancel_is_rejected_while_running() {
    let (task, started_rx, release_tx) = gated_task();
    let task = Arc::new(task);
    let runner = {
      let task = task.clone();
      thread::spawn(move || task.run())
    };

    started_rx.recv().unwrap();
    assert!(task.is_running());
    assert!(!task.cancel());
    assert!(!task.is_cancelled());

    release_tx.send(()).unwrap();
    runner.join().unwrap();
    assert!(task.is_done());
    assert!(!task.is_cancelled());
  }

  #[test]
  fn cancel_after_done_changes_nothing() {
    let task = counting_task(Arc::new(AtomicUsize::new(0)));
    task.run();
    assert!(task.cancel());
    task.run();
    assert!(task.is_done());
    assert!(!task.is_running());
    assert!(!task.is_cancelled());
    assert!(task.get().is_some());
  }

  #[test]
  fn get_duration_with_zero_timeout_is_absent() {
    let task = counting_task(Arc::new(AtomicUsize::new(0)));
    task.run();
    assert!(task.get_duration(Duration::ZERO).is_none());
    assert!(task.get_duration(Duration::from_millis(10)).is_some());
  }

  #[test]
  fn panicking_callable_is_captured_as_error_result() {
    let task = Task::new((|| -> i32 { panic!("task blew up") }).boxed());
    task.run();
    assert!(task.is_done());
    let err = task.map_v(|| ()).unwrap_err();
    assert!(matches!(err, PoolError::ResultIsError(_)));
  }

  #[test]
  fn nested_runner_is_run_by_outer_task() {
    let counter = Arc::new(AtomicUsize::new(0));
    let inner = Arc::new(counting_task(counter.clone()));
    let outer = Task::new(Nested(inner.clone()).boxed());

    outer.run();
    assert_eq!(counter.load(AtomicOrdering::SeqCst), 1);
    assert!(inner.is_done());
    assert!(outer.is_done());
    assert!(outer.get().unwrap().is_empty());
  }

  #[test]
  fn wait_times_out_for_task_never_run() {
    let task = counting_task(Arc::new(AtomicUsize::new(0)));
    assert!(!task.wait(Some(Duration::from_millis(20))));
    task.run();
    assert!(task.wait(Some(Duration::from_millis(20))));
    assert!(task.wait(None));
  }

  #[test]
  fn expire_marks_running_task_cancelled_but_lets_it_finish() {
    let (task, started_rx, release_tx) = gated_task();
    let task = Arc::new(task);
    let runner = {
      let task = task.clone();
      thread::spawn(move || task.run())
    };
    started_rx.recv().unwrap();

    assert!(task.expire());
    assert!(task.is_cancelled());
    assert!(task.wait(Some(Duration::from_millis(10))));

    release_tx.send(()).unwrap();
    runner.join().unwrap();
    assert!(task.is_done());
    assert!(task.is_cancelled());
    assert!(!task.expire());
  }

  #[test]
  fn task_ids_are_unique() {
    let a = counting_task(Arc::new(AtomicUsize::new(0)));
    let b = counting_task(Arc::new(AtomicUsize::new(0)));
    assert_ne!(a.id(), b.id());
  }
}
