use invoke_pool::{Callable, PoolError, Runner, TaskPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn work_task_fn(id: usize, duration_ms: u64) -> String {
  info!("Task {} starting (will run for {}ms)", id, duration_ms);
  std::thread::sleep(Duration::from_millis(duration_ms));
  let result = format!("Task {} finished after {}ms", id, duration_ms);
  info!("{}", result);
  result
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Graceful Interrupt Example ---");

  let pool = Arc::new(TaskPool::with_name(2, "graceful_interrupt_pool").expect("Failed to start pool"));

  // Submit 5 tasks, each takes 1 second. With 2 workers, tasks 0 and 1 start
  // while the rest wait in the queue.
  let batch = {
    let pool = pool.clone();
    std::thread::spawn(move || pool.invoke((0..5).map(|i| (move || work_task_fn(i, 1000)).boxed())))
  };

  std::thread::sleep(Duration::from_millis(100));
  info!(
    "Queue size: {}, registered: {}",
    pool.queued_task_count(),
    pool.pending_task_count()
  );
  info!("Interrupting pool...");
  pool.interrupt();

  info!("Attempting to submit task after interrupt...");
  match pool.submit((|| work_task_fn(99, 10)).boxed()) {
    Ok(_) => tracing::error!("LATE SUBMISSION SUCCEEDED (UNEXPECTED!)"),
    Err(PoolError::TaskSubmissionRejected) => info!("Late submission correctly rejected."),
    Err(e) => tracing::error!("Unexpected error: {:?}", e),
  }

  // Running tasks complete; tasks that had not started yet are cancelled.
  match batch.join().expect("Batch thread panicked") {
    Ok(runners) => {
      for runner in runners {
        let task_id = runner.id();
        match runner.map_v(|message: String| info!("Task {} result: {}", task_id, message)) {
          Ok(()) => {}
          Err(e) => info!("Task {} has no result (cancelled={}): {}", task_id, runner.is_cancelled(), e),
        }
      }
    }
    Err(e) => info!("Batch failed: {:?}", e),
  }

  pool.await_termination(None);
  info!("Pool state: {:?}", pool.state());
  info!("--- Graceful Interrupt Example End ---");
}
