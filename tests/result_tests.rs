use invoke_pool::{Callable, FromValue, IntoValues, PoolError, Runner, TaskPool, TaskResult, Value};
use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
struct LookupFailed(&'static str);

impl fmt::Display for LookupFailed {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "lookup failed for {}", self.0)
  }
}

impl std::error::Error for LookupFailed {}

#[derive(Debug, Clone, PartialEq)]
struct Point {
  x: i32,
  y: i32,
}

impl FromValue for Point {
  fn from_value(value: &Value) -> Option<Self> {
    value.downcast_ref::<Point>().cloned()
  }
}

fn lookup(key: &'static str) -> Result<u32, LookupFailed> {
  match key {
    "one" => Ok(1),
    "two" => Ok(2),
    other => Err(LookupFailed(other)),
  }
}

#[test]
fn test_map_v_receives_prefix_of_pool_results() {
  let pool = TaskPool::with_name(2, "test_pool_map_prefix").unwrap();
  let runners = pool
    .invoke(vec![(|| (1u8, 2u16, "three", 4.0f64)).boxed()])
    .unwrap();

  let result = runners[0].get().unwrap();
  assert_eq!(result.len(), 4);

  let seen = Cell::new((0u8, 0u16));
  result.map_v(|a: u8, b: u16| seen.set((a, b))).unwrap();
  assert_eq!(seen.get(), (1, 2));

  let mut all = None;
  result
    .map_v(|a: u8, b: u16, c: String, d: f64| all = Some((a, b, c, d)))
    .unwrap();
  assert_eq!(all, Some((1, 2, "three".to_string(), 4.0)));
}

#[test]
fn test_map_v_arity_mismatch_never_calls_consumer() {
  let pool = TaskPool::with_name(1, "test_pool_map_arity").unwrap();
  let runners = pool.invoke(vec![(|| (5i64,)).boxed()]).unwrap();

  let called = Cell::new(false);
  let err = runners[0]
    .map_v(|_a: i64, _b: i64, _c: i64| called.set(true))
    .unwrap_err();

  assert!(err.is_result_unavailable());
  assert!(matches!(err, PoolError::ResultArityMismatch { required: 3, produced: 1 }));
  assert!(!called.get());
}

#[test]
fn test_error_last_value_is_surfaced() {
  let pool = TaskPool::with_name(2, "test_pool_map_error").unwrap();
  let runners = pool
    .invoke(vec![(|| lookup("one")).boxed(), (|| lookup("nine")).boxed()])
    .unwrap();

  let mut value = 0;
  runners[0]
    .map_v(|v: u32, err: Option<Arc<dyn std::error::Error + Send + Sync>>| {
      assert!(err.is_none());
      value = v;
    })
    .unwrap();
  assert_eq!(value, 1);

  let called = Cell::new(false);
  let err = runners[1].map_v(|| called.set(true)).unwrap_err();
  match err {
    PoolError::ResultIsError(inner) => assert_eq!(inner.to_string(), "lookup failed for nine"),
    other => panic!("Expected ResultIsError, got {:?}", other),
  }
  assert!(!called.get());

  let last = runners[1].get().unwrap().last_error().unwrap();
  assert_eq!(last.to_string(), "lookup failed for nine");
}

#[test]
fn test_custom_types_round_trip_through_pool() {
  let pool = TaskPool::with_name(1, "test_pool_custom_type").unwrap();
  let runners = pool
    .invoke(vec![(|| vec![Value::new(Point { x: 3, y: -1 }), Value::Nil]).boxed()])
    .unwrap();

  let mut point = None;
  runners[0]
    .map_v(|p: Point, rest: Option<Point>| {
      assert!(rest.is_none());
      point = Some(p);
    })
    .unwrap();
  assert_eq!(point, Some(Point { x: 3, y: -1 }));

  let err = runners[0].map_v(|_p: String| ()).unwrap_err();
  assert!(matches!(err, PoolError::ResultTypeMismatch { index: 0 }));
}

#[test]
fn test_check_without_consumer() {
  let ok = TaskResult::from((1u8, None::<PoolError>).into_values());
  assert!(ok.check().is_ok());

  let failed = TaskResult::from((1u8, Some(PoolError::TaskPanicked)).into_values());
  assert!(matches!(failed.check(), Err(PoolError::ResultIsError(_))));

  assert!(TaskResult::default().check().is_ok());
}
