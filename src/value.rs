use crate::error::PoolError;

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// A single value produced by a task.
///
/// Tasks are heterogeneous, so their outputs are kept opaque until a caller
/// unpacks them with [`FromValue`] (usually through
/// [`TaskResult::map_v`](crate::TaskResult::map_v)). The `Error` variant is the
/// "error shape": when it is the last value of a result, the result counts as
/// failed. `Nil` stands for an absent value such as a `None` error slot.
#[derive(Clone)]
pub enum Value {
  Nil,
  Error(Arc<dyn StdError + Send + Sync>),
  Any(Arc<dyn Any + Send + Sync>),
}

impl Value {
  /// Wraps an arbitrary value. Errors should go through [`Value::error`]
  /// instead, otherwise they are not recognised as failures.
  pub fn new<T: Any + Send + Sync>(value: T) -> Self {
    Value::Any(Arc::new(value))
  }

  pub fn error<E: StdError + Send + Sync + 'static>(err: E) -> Self {
    Value::Error(Arc::new(err))
  }

  pub fn is_nil(&self) -> bool {
    matches!(self, Value::Nil)
  }

  pub fn is_error(&self) -> bool {
    matches!(self, Value::Error(_))
  }

  pub fn as_error(&self) -> Option<&Arc<dyn StdError + Send + Sync>> {
    match self {
      Value::Error(err) => Some(err),
      _ => None,
    }
  }

  /// Borrows the wrapped value if it is a `T`.
  pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
    match self {
      Value::Any(inner) => (**inner).downcast_ref::<T>(),
      _ => None,
    }
  }
}

impl fmt::Debug for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Nil => f.write_str("Nil"),
      Value::Error(err) => f.debug_tuple("Error").field(&format_args!("{}", err)).finish(),
      Value::Any(_) => f.write_str("Any(..)"),
    }
  }
}

/// Conversion of one returned item into a [`Value`].
pub trait IntoValue {
  fn into_value(self) -> Value;
}

/// Conversion of a callable's whole return into the ordered values of a
/// result.
///
/// `()` produces nothing, tuples produce one value per element, and a
/// `Result<T, E>` produces the `(value, nil)` or `(nil, error)` pair.
pub trait IntoValues {
  fn into_values(self) -> Vec<Value>;
}

/// Extraction of a typed parameter from a produced [`Value`].
///
/// Returns `None` when the value has a different type. Implement it for your
/// own types with [`Value::downcast_ref`].
pub trait FromValue: Sized {
  fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! scalar_values {
  ($($ty:ty),* $(,)?) => {
    $(
      impl IntoValue for $ty {
        fn into_value(self) -> Value {
          Value::new(self)
        }
      }

      impl IntoValues for $ty {
        fn into_values(self) -> Vec<Value> {
          vec![self.into_value()]
        }
      }

      impl FromValue for $ty {
        fn from_value(value: &Value) -> Option<Self> {
          value.downcast_ref::<$ty>().cloned()
        }
      }
    )*
  };
}

scalar_values!(bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, String);

impl IntoValue for &'static str {
  fn into_value(self) -> Value {
    Value::new(self.to_string())
  }
}

impl IntoValues for &'static str {
  fn into_values(self) -> Vec<Value> {
    vec![self.into_value()]
  }
}

impl IntoValue for Value {
  fn into_value(self) -> Value {
    self
  }
}

impl IntoValues for Value {
  fn into_values(self) -> Vec<Value> {
    vec![self]
  }
}

impl FromValue for Value {
  fn from_value(value: &Value) -> Option<Self> {
    Some(value.clone())
  }
}

impl<T: IntoValue> IntoValue for Option<T> {
  fn into_value(self) -> Value {
    match self {
      Some(inner) => inner.into_value(),
      None => Value::Nil,
    }
  }
}

impl<T: IntoValue> IntoValues for Option<T> {
  fn into_values(self) -> Vec<Value> {
    vec![self.into_value()]
  }
}

impl<T: FromValue> FromValue for Option<T> {
  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Nil => Some(None),
      other => T::from_value(other).map(Some),
    }
  }
}

impl IntoValue for Arc<dyn StdError + Send + Sync> {
  fn into_value(self) -> Value {
    Value::Error(self)
  }
}

impl FromValue for Arc<dyn StdError + Send + Sync> {
  fn from_value(value: &Value) -> Option<Self> {
    value.as_error().cloned()
  }
}

impl IntoValue for Box<dyn StdError + Send + Sync> {
  fn into_value(self) -> Value {
    Value::Error(Arc::from(self))
  }
}

impl IntoValue for PoolError {
  fn into_value(self) -> Value {
    Value::error(self)
  }
}

impl IntoValues for () {
  fn into_values(self) -> Vec<Value> {
    Vec::new()
  }
}

impl IntoValues for Vec<Value> {
  fn into_values(self) -> Vec<Value> {
    self
  }
}

impl<T: IntoValue, E: StdError + Send + Sync + 'static> IntoValues for Result<T, E> {
  fn into_values(self) -> Vec<Value> {
    match self {
      Ok(value) => vec![value.into_value(), Value::Nil],
      Err(err) => vec![Value::Nil, Value::error(err)],
    }
  }
}

macro_rules! tuple_values {
  ($($ty:ident $var:ident),+) => {
    impl<$($ty: IntoValue),+> IntoValues for ($($ty,)+) {
      fn into_values(self) -> Vec<Value> {
        let ($($var,)+) = self;
        vec![$($var.into_value()),+]
      }
    }
  };
}

tuple_values!(A a);
tuple_values!(A a, B b);
tuple_values!(A a, B b, C c);
tuple_values!(A a, B b, C c, D d);
tuple_values!(A a, B b, C c, D d, E e);
tuple_values!(A a, B b, C c, D d, E e, F f);

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug)]
  struct Boom;

  impl fmt::Display for Boom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str("boom")
    }
  }

  impl StdError for Boom {}

  #[test]
  fn tuple_with_nil_error_keeps_order() {
    let values = (7i32, "seven", None::<Arc<dyn StdError + Send + Sync>>).into_values();
    assert_eq!(values.len(), 3);
    assert_eq!(i32::from_value(&values[0]), Some(7));
    assert_eq!(String::from_value(&values[1]).as_deref(), Some("seven"));
    assert!(values[2].is_nil());
  }

  #[test]
  fn std_result_follows_value_error_convention() {
    let ok: Result<u8, Boom> = Ok(3);
    let values = ok.into_values();
    assert_eq!(u8::from_value(&values[0]), Some(3));
    assert!(values[1].is_nil());

    let failed: Result<u8, Boom> = Err(Boom);
    let values = failed.into_values();
    assert!(values[0].is_nil());
    assert_eq!(values[1].as_error().map(|e| e.to_string()), Some("boom".to_string()));
  }

  #[test]
  fn from_value_rejects_other_types() {
    let value = 1u64.into_value();
    assert_eq!(u64::from_value(&value), Some(1));
    assert_eq!(i64::from_value(&value), None);
    assert_eq!(Option::<u64>::from_value(&Value::Nil), Some(None));
    assert_eq!(Option::<u64>::from_value(&value), Some(Some(1)));
    assert!(<Arc<dyn StdError + Send + Sync>>::from_value(&value).is_none());
  }

  #[test]
  fn unit_produces_no_values() {
    assert!(().into_values().is_empty());
  }
}
