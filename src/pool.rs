use crate::error::PoolError;
use crate::runner::Runner;
use crate::task::{Task, TaskToExecute};
use crate::task_queue::TaskQueue;

use std::fmt;
use std::sync::{Arc, Once};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, info_span, trace, warn};

const DEFAULT_POOL_NAME: &str = "invoke_pool";

/// How often an interrupted pool re-checks whether its tasks have drained.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle of a [`TaskPool`]. Transitions only go forward, and only once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
  /// Accepting and running tasks.
  Active,
  /// No longer accepting tasks; waiting for registered tasks to finish or be
  /// cancelled.
  Interrupting,
  /// Every pool thread has been stopped and joined.
  Stopped,
}

struct PoolThreads {
  // Dropping a sender closes the matching thread's shutdown signal.
  worker_signals: Vec<Sender<()>>,
  dispatcher_signal: Sender<()>,
  handles: Vec<JoinHandle<()>>,
}

struct PoolShared {
  pool_name: Arc<String>,
  worker_count: usize,
  state: Mutex<PoolState>,
  state_changed: Condvar,
  queue: TaskQueue<Arc<Task>>,
  registry: DashMap<u64, Arc<Task>>,
  threads: Mutex<Option<PoolThreads>>,
  start_once: Once,
}

/// A fixed-size pool of worker threads executing batches of callables.
///
/// Submitted tasks are pushed on a LIFO queue; a dispatcher thread moves them
/// into a bounded channel (capacity `2 * worker_count`) that the workers
/// consume. [`TaskPool::interrupt`] stops accepting work immediately and
/// stops the threads once every registered task is done or cancelled.
///
/// Dropping the pool interrupts it.
pub struct TaskPool {
  shared: Arc<PoolShared>,
}

impl TaskPool {
  /// Creates a pool with `worker_count` worker threads (at least one) and
  /// starts it.
  pub fn new(worker_count: usize) -> Result<Self, PoolError> {
    Self::with_name(worker_count, DEFAULT_POOL_NAME)
  }

  /// Same as [`TaskPool::new`]; `pool_name` prefixes thread names and log
  /// fields.
  pub fn with_name(worker_count: usize, pool_name: &str) -> Result<Self, PoolError> {
    let pool = Self {
      shared: Arc::new(PoolShared {
        pool_name: Arc::new(pool_name.to_string()),
        worker_count: worker_count.max(1),
        state: Mutex::new(PoolState::Active),
        state_changed: Condvar::new(),
        queue: TaskQueue::new(),
        registry: DashMap::new(),
        threads: Mutex::new(None),
        start_once: Once::new(),
      }),
    };
    pool.start()?;
    Ok(pool)
  }

  /// Spawns the workers and the dispatcher. Only the first call does anything.
  fn start(&self) -> Result<(), PoolError> {
    let mut outcome = Ok(());
    self.shared.start_once.call_once(|| outcome = PoolShared::spawn_threads(&self.shared));
    outcome
  }

  pub fn name(&self) -> &str {
    &self.shared.pool_name
  }

  pub fn worker_count(&self) -> usize {
    self.shared.worker_count
  }

  pub fn state(&self) -> PoolState {
    *self.shared.state.lock()
  }

  /// Returns `true` once [`TaskPool::interrupt`] has been called.
  pub fn is_interrupted(&self) -> bool {
    self.shared.is_interrupted()
  }

  pub fn is_stopped(&self) -> bool {
    self.state() == PoolState::Stopped
  }

  /// Returns the number of tasks waiting in the queue for the dispatcher.
  pub fn queued_task_count(&self) -> usize {
    self.shared.queue.len()
  }

  /// Returns the number of registered tasks that have not been run by a
  /// worker yet, including the ones currently running.
  pub fn pending_task_count(&self) -> usize {
    self.shared.registry.len()
  }

  /// Submits a single callable.
  ///
  /// # Errors
  /// Returns `PoolError::TaskSubmissionRejected` if the pool is interrupted.
  pub fn submit(&self, callable: TaskToExecute) -> Result<Arc<Task>, PoolError> {
    let state = self.shared.state.lock();
    if *state != PoolState::Active {
      warn!(pool_name = %*self.shared.pool_name, "Submit: Attempted to add a task to an interrupted pool.");
      return Err(PoolError::TaskSubmissionRejected);
    }
    let task = Arc::new(Task::new(callable));
    // Registered before it is queued so a worker can never deregister it first.
    self.shared.registry.insert(task.id(), task.clone());
    self.shared.queue.push(task.clone());
    drop(state);

    debug!(pool_name = %*self.shared.pool_name, task_id = task.id(), "Task submitted to queue.");
    Ok(task)
  }

  /// Runs a batch of callables and waits for all of them to finish.
  ///
  /// Equivalent to [`TaskPool::invoke_duration`] without a timeout.
  pub fn invoke<I>(&self, tasks: I) -> Result<Vec<Arc<Task>>, PoolError>
  where
    I: IntoIterator<Item = TaskToExecute>,
  {
    self.invoke_duration(tasks, Duration::ZERO)
  }

  /// Runs a batch of callables and waits until each one is done or the
  /// shared `timeout` elapses. A zero timeout waits without bound.
  ///
  /// Tasks not done at the deadline are marked cancelled; a task whose
  /// callable already started still finishes in the background. The returned
  /// runners are in submission order.
  ///
  /// # Errors
  /// Returns `PoolError::PoolInterrupted` if the pool was interrupted before
  /// the call, and `PoolError::TaskSubmissionRejected` if it was interrupted
  /// while the batch was being submitted. In the latter case the tasks
  /// already submitted are cancelled and no runners are returned.
  pub fn invoke_duration<I>(&self, tasks: I, timeout: Duration) -> Result<Vec<Arc<Task>>, PoolError>
  where
    I: IntoIterator<Item = TaskToExecute>,
  {
    if self.is_interrupted() {
      warn!(pool_name = %*self.shared.pool_name, "Invoke: Pool is interrupted, batch refused.");
      return Err(PoolError::PoolInterrupted);
    }

    let mut runners = Vec::new();
    for callable in tasks {
      match self.submit(callable) {
        Ok(task) => runners.push(task),
        Err(err) => {
          warn!(
            pool_name = %*self.shared.pool_name,
            submitted = runners.len(),
            "Invoke: Batch submission failed, cancelling already submitted tasks."
          );
          for task in &runners {
            task.cancel();
          }
          return Err(err);
        }
      }
    }

    let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
    trace!(pool_name = %*self.shared.pool_name, batch = runners.len(), ?timeout, "Supervising batch.");

    thread::scope(|scope| {
      for task in &runners {
        let spawned = thread::Builder::new()
          .name(format!("{}-supervisor", self.shared.pool_name))
          .spawn_scoped(scope, move || supervise(task, deadline));
        if let Err(err) = spawned {
          warn!(pool_name = %*self.shared.pool_name, task_id = task.id(), "Failed to spawn supervisor ({}), supervising inline.", err);
          supervise(task, deadline);
        }
      }
    });

    Ok(runners)
  }

  /// Stops accepting new tasks and shuts the pool down once every registered
  /// task is done or cancelled.
  ///
  /// Submission is rejected as soon as this returns; thread teardown happens
  /// asynchronously, see [`TaskPool::await_termination`]. Calling it again is
  /// a no-op.
  pub fn interrupt(&self) {
    {
      let mut state = self.shared.state.lock();
      if *state != PoolState::Active {
        trace!(pool_name = %*self.shared.pool_name, "Interrupt already in progress or completed.");
        return;
      }
      *state = PoolState::Interrupting;
    }
    info!(pool_name = %*self.shared.pool_name, "Pool interrupted. Draining registered tasks before stopping.");

    let shared = self.shared.clone();
    let spawned = thread::Builder::new()
      .name(format!("{}-drain", self.shared.pool_name))
      .spawn(move || shared.drain_and_stop());
    if let Err(err) = spawned {
      error!(pool_name = %*self.shared.pool_name, "Failed to spawn drain thread ({}), draining on the calling thread.", err);
      self.shared.drain_and_stop();
    }
  }

  /// Blocks until the pool has stopped, or until `timeout` elapses.
  ///
  /// Only an interrupted pool ever stops. Returns `true` if it did.
  pub fn await_termination(&self, timeout: Option<Duration>) -> bool {
    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    let mut state = self.shared.state.lock();
    while *state != PoolState::Stopped {
      match deadline {
        Some(deadline) => {
          if self.shared.state_changed.wait_until(&mut state, deadline).timed_out() {
            return *state == PoolState::Stopped;
          }
        }
        None => self.shared.state_changed.wait(&mut state),
      }
    }
    true
  }

  #[cfg(test)]
  fn live_thread_count(&self) -> usize {
    self.shared.threads.lock().as_ref().map_or(0, |threads| threads.handles.len())
  }
}

fn supervise(task: &Task, deadline: Option<Instant>) {
  if task.wait_until(deadline) {
    return;
  }
  if task.expire() {
    debug!(task_id = task.id(), "Batch deadline elapsed before the task finished, task cancelled.");
  }
}

impl PoolShared {
  fn is_interrupted(&self) -> bool {
    *self.state.lock() != PoolState::Active
  }

  fn spawn_threads(shared: &Arc<Self>) -> Result<(), PoolError> {
    let (task_tx, task_rx) = bounded::<Arc<Task>>(shared.worker_count * 2);
    let mut worker_signals = Vec::with_capacity(shared.worker_count);
    let mut handles = Vec::with_capacity(shared.worker_count + 1);

    // On an early return the senders collected so far are dropped, which
    // stops the threads already spawned.
    for worker_id in 0..shared.worker_count {
      let (signal_tx, signal_rx) = bounded::<()>(0);
      let worker_shared = shared.clone();
      let worker_rx = task_rx.clone();
      let handle = thread::Builder::new()
        .name(format!("{}-worker-{}", shared.pool_name, worker_id))
        .spawn(move || Self::run_worker(worker_shared, worker_id, worker_rx, signal_rx))
        .map_err(|e| PoolError::ThreadSpawn(e.to_string()))?;
      worker_signals.push(signal_tx);
      handles.push(handle);
    }
    drop(task_rx);

    let (dispatcher_signal, dispatcher_rx) = bounded::<()>(0);
    let dispatcher_shared = shared.clone();
    let handle = thread::Builder::new()
      .name(format!("{}-dispatcher", shared.pool_name))
      .spawn(move || Self::run_dispatcher(dispatcher_shared, task_tx, dispatcher_rx))
      .map_err(|e| PoolError::ThreadSpawn(e.to_string()))?;
    handles.push(handle);

    *shared.threads.lock() = Some(PoolThreads {
      worker_signals,
      dispatcher_signal,
      handles,
    });
    info!(pool_name = %*shared.pool_name, workers = shared.worker_count, "Pool started.");
    Ok(())
  }

  fn run_worker(shared: Arc<Self>, worker_id: usize, tasks: Receiver<Arc<Task>>, shutdown: Receiver<()>) {
    let _span = info_span!("pool_worker", pool_name = %*shared.pool_name, worker_id).entered();
    debug!("Worker started.");

    while let Some(task) = select! {
      recv(shutdown) -> _closed => None,
      recv(tasks) -> msg => msg.ok(),
    } {
      let task_id = task.id();
      if shared.is_interrupted() {
        trace!(task_id, "Pool interrupted, cancelling task before run.");
        task.cancel();
      }
      task.run();
      shared.registry.remove(&task_id);
      trace!(task_id, done = task.is_done(), cancelled = task.is_cancelled(), "Worker finished with task.");
    }

    debug!("Worker stopped.");
  }

  fn run_dispatcher(shared: Arc<Self>, tasks: Sender<Arc<Task>>, shutdown: Receiver<()>) {
    let _span = info_span!("pool_dispatcher", pool_name = %*shared.pool_name).entered();
    debug!("Dispatcher started.");

    while let Some(task) = shared.queue.pop_blocking() {
      let task_id = task.id();
      let forwarded = select! {
        send(tasks, task) -> res => res.is_ok(),
        recv(shutdown) -> _closed => false,
      };
      if !forwarded {
        debug!(task_id, "Shutdown while forwarding, task dropped.");
        break;
      }
      trace!(task_id, "Task forwarded to workers.");
    }

    debug!("Dispatcher stopped.");
  }

  fn drain_and_stop(&self) {
    let _span = info_span!("pool_drain", pool_name = %*self.pool_name).entered();

    loop {
      let outstanding = self
        .registry
        .iter()
        .filter(|entry| !(entry.value().is_done() || entry.value().is_cancelled()))
        .count();
      if outstanding == 0 {
        break;
      }
      trace!(outstanding, "Waiting for registered tasks to drain.");
      thread::sleep(DRAIN_POLL_INTERVAL);
    }
    debug!("All registered tasks drained. Closing shutdown signals.");

    let threads = self.threads.lock().take();
    self.queue.close();

    let leftover = self.queue.pop_all();
    for task in &leftover {
      task.expire();
    }
    if !leftover.is_empty() {
      debug!(count = leftover.len(), "Discarded cancelled tasks still queued at shutdown.");
    }

    if let Some(PoolThreads {
      worker_signals,
      dispatcher_signal,
      handles,
    }) = threads
    {
      drop(worker_signals);
      drop(dispatcher_signal);
      for handle in handles {
        let thread_name = handle.thread().name().unwrap_or("unnamed").to_string();
        if handle.join().is_err() {
          error!(thread = %thread_name, "Pool thread panicked before joining.");
        }
      }
    }
    self.registry.clear();

    *self.state.lock() = PoolState::Stopped;
    self.state_changed.notify_all();
    info!("Pool stopped.");
  }
}

impl Drop for TaskPool {
  fn drop(&mut self) {
    if !self.shared.is_interrupted() {
      info!(
        pool_name = %*self.shared.pool_name,
        "TaskPool dropped. Initiating implicit interrupt."
      );
      self.interrupt();
    } else {
      trace!(pool_name = %*self.shared.pool_name, "Drop: Interrupt already initiated.");
    }
  }
}

impl fmt::Debug for TaskPool {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskPool")
      .field("pool_name", &self.shared.pool_name)
      .field("worker_count", &self.shared.worker_count)
      .field("state", &self.state())
      .field("queued", &self.queued_task_count())
      .field("pending", &self.pending_task_count())
      .finish()
  }
}
