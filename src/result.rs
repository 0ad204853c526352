use crate::error::PoolError;
use crate::value::{FromValue, Value};

use std::error::Error as StdError;
use std::sync::Arc;

/// The ordered values produced by one task execution.
///
/// By convention a non-nil error in the last position marks the execution as
/// failed; [`TaskResult::map_v`] refuses to hand such a result to a consumer.
#[derive(Debug, Clone, Default)]
pub struct TaskResult {
  values: Vec<Value>,
}

impl TaskResult {
  pub(crate) fn new(values: Vec<Value>) -> Self {
    Self { values }
  }

  pub fn values(&self) -> &[Value] {
    &self.values
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&Value> {
    self.values.get(index)
  }

  /// Returns the error carried by the last value, if any.
  pub fn last_error(&self) -> Option<Arc<dyn StdError + Send + Sync>> {
    self.values.last().and_then(|last| last.as_error().cloned())
  }

  /// Fails with [`PoolError::ResultIsError`] when the last value is an error.
  pub fn check(&self) -> Result<(), PoolError> {
    match self.last_error() {
      Some(err) => Err(PoolError::ResultIsError(err)),
      None => Ok(()),
    }
  }

  /// Unpacks the produced values into `consumer`.
  ///
  /// The consumer receives the first `n` values in order, where `n` is its
  /// parameter count; whatever it returns is discarded. It is never invoked
  /// when the result carries an error, when it asks for more values than were
  /// produced, or when a value cannot be converted to its parameter type.
  ///
  /// ```
  /// # use invoke_pool::{IntoValues, TaskResult};
  /// let result = TaskResult::from((2usize, "two").into_values());
  /// let mut seen = None;
  /// result.map_v(|n: usize, name: String| seen = Some((n, name))).unwrap();
  /// assert_eq!(seen, Some((2, "two".to_string())));
  /// ```
  pub fn map_v<Args, C: Consumer<Args>>(&self, consumer: C) -> Result<(), PoolError> {
    self.check()?;
    if C::ARITY > self.values.len() {
      return Err(PoolError::ResultArityMismatch {
        required: C::ARITY,
        produced: self.values.len(),
      });
    }
    consumer.consume(&self.values[..C::ARITY])
  }
}

impl From<Vec<Value>> for TaskResult {
  fn from(values: Vec<Value>) -> Self {
    Self::new(values)
  }
}

/// A callback that [`TaskResult::map_v`] can unpack values into.
///
/// Implemented for every `FnOnce(A1, .., An) -> R` with up to six parameters
/// where each parameter implements [`FromValue`]. Closure parameters need
/// explicit types so the arity can be resolved.
pub trait Consumer<Args> {
  const ARITY: usize;

  /// `values` holds exactly `ARITY` items.
  fn consume(self, values: &[Value]) -> Result<(), PoolError>;
}

macro_rules! impl_consumer {
  ($arity:expr; $($arg:ident $var:ident $idx:tt),*) => {
    impl<Func, Ret, $($arg,)*> Consumer<($($arg,)*)> for Func
    where
      Func: FnOnce($($arg),*) -> Ret,
      $($arg: FromValue,)*
    {
      const ARITY: usize = $arity;

      #[allow(unused_variables)]
      fn consume(self, values: &[Value]) -> Result<(), PoolError> {
        $(
          let $var = <$arg as FromValue>::from_value(&values[$idx])
            .ok_or(PoolError::ResultTypeMismatch { index: $idx })?;
        )*
        let _ = (self)($($var),*);
        Ok(())
      }
    }
  };
}

impl_consumer!(0;);
impl_consumer!(1; A1 a1 0);
impl_consumer!(2; A1 a1 0, A2 a2 1);
impl_consumer!(3; A1 a1 0, A2 a2 1, A3 a3 2);
impl_consumer!(4; A1 a1 0, A2 a2 1, A3 a3 2, A4 a4 3);
impl_consumer!(5; A1 a1 0, A2 a2 1, A3 a3 2, A4 a4 3, A5 a5 4);
impl_consumer!(6; A1 a1 0, A2 a2 1, A3 a3 2, A4 a4 3, A5 a5 4, A6 a6 5);

#[cfg(test)]
mod tests {
  use super::*;
  use crate::value::IntoValues;
  use std::cell::Cell;

  fn result_of<V: IntoValues>(values: V) -> TaskResult {
    TaskResult::from(values.into_values())
  }

  #[test]
  fn last_error_only_looks_at_final_value() {
    let failed = result_of((1i32, PoolError::TaskPanicked));
    assert!(failed.last_error().is_some());

    let leading_error = result_of((PoolError::TaskPanicked, 1i32));
    assert!(leading_error.last_error().is_none());

    let nil_error = result_of((1i32, None::<PoolError>));
    assert!(nil_error.last_error().is_none());
    assert!(result_of(()).last_error().is_none());
  }

  #[test]
  fn map_v_passes_prefix_in_order() {
    let result = result_of((10u32, 20u32, 30u32));
    let got = Cell::new((0, 0));
    result.map_v(|a: u32, b: u32| got.set((a, b))).unwrap();
    assert_eq!(got.get(), (10, 20));
  }

  #[test]
  fn map_v_rejects_consumer_needing_more_values() {
    let result = result_of((1u8,));
    let called = Cell::new(false);
    let err = result.map_v(|_a: u8, _b: u8| called.set(true)).unwrap_err();
    assert!(matches!(err, PoolError::ResultArityMismatch { required: 2, produced: 1 }));
    assert!(err.is_result_unavailable());
    assert!(!called.get());
  }

  #[test]
  fn map_v_reports_error_before_arity() {
    let result = result_of((PoolError::TaskPanicked,));
    let called = Cell::new(false);
    let err = result
      .map_v(|_a: u8, _b: u8, _c: u8| called.set(true))
      .unwrap_err();
    assert!(matches!(err, PoolError::ResultIsError(_)));
    assert!(!called.get());
  }

  #[test]
  fn map_v_type_mismatch_names_position() {
    let result = result_of((1u8, "text"));
    let err = result.map_v(|_a: u8, _b: u64| ()).unwrap_err();
    assert!(matches!(err, PoolError::ResultTypeMismatch { index: 1 }));
  }

  #[test]
  fn zero_arity_consumer_runs_on_empty_result() {
    let called = Cell::new(false);
    result_of(()).map_v(|| called.set(true)).unwrap();
    assert!(called.get());
  }
}
