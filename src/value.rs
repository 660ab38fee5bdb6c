use crate::array::List;
use crate::observable::Object;

/// A property value.
///
/// Plain data lives in `Json`; `Object` and `List` are handles to observable
/// entities, compared by identity.
#[derive(Clone, Debug)]
pub enum Value {
  Json(serde_json::Value),
  Object(Object),
  List(List),
}

impl Value {
  pub const NULL: Value = Value::Json(serde_json::Value::Null);

  pub fn is_null(&self) -> bool {
    matches!(self, Value::Json(serde_json::Value::Null))
  }

  pub fn as_json(&self) -> Option<&serde_json::Value> {
    match self {
      Value::Json(json) => Some(json),
      _ => None,
    }
  }

  pub fn as_object(&self) -> Option<&Object> {
    match self {
      Value::Object(obj) => Some(obj),
      _ => None,
    }
  }

  pub fn as_list(&self) -> Option<&List> {
    match self {
      Value::List(list) => Some(list),
      _ => None,
    }
  }

  /// The entity that key observers attach to: the object itself, or the
  /// observation component of a list.
  pub fn as_observable(&self) -> Option<Object> {
    match self {
      Value::Object(obj) => Some(obj.clone()),
      Value::List(list) => Some(list.entity().clone()),
      Value::Json(_) => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    self.as_json().and_then(|json| json.as_i64())
  }

  pub fn as_f64(&self) -> Option<f64> {
    self.as_json().and_then(|json| json.as_f64())
  }

  pub fn as_bool(&self) -> Option<bool> {
    self.as_json().and_then(|json| json.as_bool())
  }

  pub fn as_str(&self) -> Option<&str> {
    self.as_json().and_then(|json| json.as_str())
  }

  pub fn truthy(&self) -> bool {
    match self {
      Value::Json(serde_json::Value::Null) => false,
      Value::Json(serde_json::Value::Bool(b)) => *b,
      Value::Json(serde_json::Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
      Value::Json(serde_json::Value::String(s)) => !s.is_empty(),
      _ => true,
    }
  }

  /// Null, the empty string, an empty JSON array or an empty list.
  pub fn is_empty(&self) -> bool {
    match self {
      Value::Json(serde_json::Value::Null) => true,
      Value::Json(serde_json::Value::String(s)) => s.is_empty(),
      Value::Json(serde_json::Value::Array(items)) => items.is_empty(),
      Value::List(list) => list.len() == 0,
      _ => false,
    }
  }
}

impl Default for Value {
  fn default() -> Self {
    Value::NULL
  }
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Value::Json(a), Value::Json(b)) => a == b,
      (Value::Object(a), Value::Object(b)) => a == b,
      (Value::List(a), Value::List(b)) => a == b,
      _ => false,
    }
  }
}

impl std::fmt::Display for Value {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Value::Json(json) => write!(f, "{}", json),
      Value::Object(obj) => write!(f, "<{}>", obj.id()),
      Value::List(list) => write!(f, "<list {} len={}>", list.entity().id(), list.len()),
    }
  }
}

impl From<serde_json::Value> for Value {
  fn from(json: serde_json::Value) -> Self {
    Value::Json(json)
  }
}

impl From<Object> for Value {
  fn from(obj: Object) -> Self {
    Value::Object(obj)
  }
}

impl From<&Object> for Value {
  fn from(obj: &Object) -> Self {
    Value::Object(obj.clone())
  }
}

impl From<List> for Value {
  fn from(list: List) -> Self {
    Value::List(list)
  }
}

impl From<&List> for Value {
  fn from(list: &List) -> Self {
    Value::List(list.clone())
  }
}

impl<T> From<Option<T>> for Value
where T: Into<Value> {
  fn from(value: Option<T>) -> Self {
    value.map_or(Value::NULL, Into::into)
  }
}

macro_rules! json_scalar {
  ($($ty:ty),*) => {
    $(
      impl From<$ty> for Value {
        fn from(value: $ty) -> Self {
          Value::Json(value.into())
        }
      }
    )*
  };
}

json_scalar!(bool, i32, i64, u32, u64, usize, f64, String, &str);
