use invoke_pool::{Callable, PoolError, Runner, TaskToExecute};
use std::time::Duration;
use tracing::info;

fn my_task_fn(id: usize, delay_ms: u64) -> (String, Option<PoolError>) {
  info!("Task {} starting, will sleep for {}ms", id, delay_ms);
  std::thread::sleep(Duration::from_millis(delay_ms));
  let result = format!("Task {} finished successfully after {}ms", id, delay_ms);
  info!("{}", result);
  (result, None)
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false) // Disable module paths for cleaner example output
    .init();

  info!("--- Basic Usage Example ---");

  let pool = invoke_pool::new(2).expect("Failed to start pool");

  let tasks: Vec<TaskToExecute> = (0..5)
    .map(|i| {
      // Alternate sleep times for variety
      let sleep_duration: u64 = 200 + (i as u64 % 3 * 100);
      (move || my_task_fn(i, sleep_duration)).boxed()
    })
    .collect();

  let runners = match pool.invoke(tasks) {
    Ok(runners) => runners,
    Err(e) => {
      tracing::error!("Failed to invoke batch: {:?}", e);
      return;
    }
  };

  info!("Batch finished. Collecting results...");
  for runner in &runners {
    let task_id = runner.id();
    match runner.map_v(|message: String| info!("Result for task {}: {}", task_id, message)) {
      Ok(()) => {}
      Err(e) => info!("Error for task {}: {}", task_id, e),
    }
    info!("Task {} done: {}", task_id, runner.is_done());
  }

  info!("Interrupting pool.");
  pool.interrupt();
  pool.await_termination(None);
  info!("--- Basic Usage Example End ---");
}
