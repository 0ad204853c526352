use invoke_pool::{Callable, Runner, TaskPool};
use std::time::{Duration, Instant};
use tracing::info;

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Batch Timeout Example ---");

  let pool = TaskPool::with_name(1, "batch_timeout_pool").expect("Failed to start pool");

  // With a single worker the slow task is still running when the deadline
  // passes, and the fast one never gets dispatched in time.
  let started = Instant::now();
  let runners = pool
    .invoke_duration(
      vec![
        (|| {
          std::thread::sleep(Duration::from_millis(500));
          "slow"
        })
        .boxed(),
        (|| "fast").boxed(),
      ],
      Duration::from_millis(100),
    )
    .expect("Batch was refused");
  info!("invoke_duration returned after {:?}", started.elapsed());

  for runner in &runners {
    info!(
      "Task {}: running={} done={} cancelled={}",
      runner.id(),
      runner.is_running(),
      runner.is_done(),
      runner.is_cancelled()
    );
  }

  pool.interrupt();
  pool.await_termination(Some(Duration::from_secs(5)));
  for runner in &runners {
    info!("After shutdown, task {}: done={} cancelled={}", runner.id(), runner.is_done(), runner.is_cancelled());
  }
  info!("--- Batch Timeout Example End ---");
}
