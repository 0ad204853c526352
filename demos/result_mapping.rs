use invoke_pool::{Callable, PoolError, TaskPool};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
struct ParseFailure(String);

impl fmt::Display for ParseFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "cannot parse {:?}", self.0)
  }
}

impl Error for ParseFailure {}

fn parse(input: &'static str) -> Result<i64, ParseFailure> {
  input.parse::<i64>().map_err(|_| ParseFailure(input.to_string()))
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::INFO)
    .with_target(false)
    .init();
  info!("--- Result Mapping Example ---");

  let pool = TaskPool::with_name(2, "result_mapping_pool").expect("Failed to start pool");
  let inputs = ["17", "42", "forty-two"];

  let runners = pool
    .invoke(inputs.iter().map(|&input| (move || parse(input)).boxed()))
    .expect("Batch was refused");

  for (input, runner) in inputs.iter().zip(&runners) {
    let outcome = runner.map_v(|value: i64, err: Option<Arc<dyn Error + Send + Sync>>| {
      info!("{:?} parsed to {} (error: {:?})", input, value, err.map(|e| e.to_string()));
    });
    match outcome {
      Ok(()) => {}
      Err(PoolError::ResultIsError(err)) => info!("{:?} failed: {}", input, err),
      Err(e) => info!("{:?} could not be mapped: {}", input, e),
    }
  }

  // Asking for more values than a task produced is refused.
  if let Err(e) = runners[0].map_v(|_a: i64, _b: Option<i64>, _c: i64| ()) {
    info!("Arity check: {}", e);
  }

  pool.interrupt();
  info!("--- Result Mapping Example End ---");
}
