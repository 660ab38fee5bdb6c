//! Property path resolution.
//!
//! A path is a `.`-separated list of keys (`address.city`, `phones.1`). A
//! `*` marks where a path stops being resolved once and starts being observed:
//! for `owner.address*city.name` the object at `owner.address` is looked up
//! now and `city.name` is the (chained) key observed on it. For reads a `*`
//! behaves like a `.`.
//!
//! Resolution never fails loudly: a missing hop yields null. Use
//! [`required_object_for_property_path`] when a missing hop is a bug.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::observable::Object;
use crate::value::Value;
use crate::{Gettable, Settable};

static INDEX_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid index pattern"));

pub fn is_index(segment: &str) -> bool {
  INDEX_SEGMENT.is_match(segment)
}

pub(crate) fn segments(path: &str) -> Vec<&str> {
  path.split(|c| c == '.' || c == '*').filter(|s| !s.is_empty()).collect()
}

pub(crate) fn json_get(json: &serde_json::Value, key: &str) -> Value {
  match json {
    serde_json::Value::Array(items) if is_index(key) => key
      .parse::<usize>()
      .ok()
      .and_then(|index| items.get(index))
      .cloned()
      .map_or(Value::NULL, Value::Json),
    serde_json::Value::Array(items) if key == "length" => Value::from(items.len()),
    serde_json::Value::String(s) if key == "length" => Value::from(s.chars().count()),
    serde_json::Value::Object(map) => map.get(key).cloned().map_or(Value::NULL, Value::Json),
    _ => Value::NULL,
  }
}

pub(crate) fn walk(mut current: Value, segments: &[&str]) -> Value {
  for segment in segments {
    if current.is_null() {
      return Value::NULL;
    }
    current = get(&current, segment);
  }
  current
}

pub fn get(root: &Value, key: &str) -> Value {
  root.get(key)
}

pub fn get_path(root: &Value, path: &str) -> Value {
  walk(root.clone(), &segments(path))
}

pub fn set(root: &Value, key: &str, value: impl Into<Value>) -> Result<()> {
  root.set(key, value.into())
}

pub fn set_path(root: &Value, path: &str, value: impl Into<Value>) -> Result<()> {
  let value = value.into();
  let normalized = path.replace('*', ".");
  let (prefix, key) = match normalized.rfind('.') {
    Some(stop) => (&normalized[..stop], &normalized[stop + 1..]),
    None => ("", normalized.as_str()),
  };
  match object_for_property_path(root, prefix) {
    Some(target) => target.set(key, value),
    None => {
      log::debug!("set_path: `{}` does not resolve, ignoring", path);
      Ok(())
    }
  }
}

/// Follows `path` from `root`. `None` when any hop, or the result, is null.
pub fn object_for_property_path(root: &Value, path: &str) -> Option<Value> {
  let mut current = root.clone();
  for segment in segments(path) {
    current = get(&current, segment);
    if current.is_null() {
      return None;
    }
  }
  if current.is_null() {
    None
  } else {
    Some(current)
  }
}

pub fn required_object_for_property_path(root: &Value, path: &str) -> Result<Value> {
  object_for_property_path(root, path).ok_or_else(|| Error::PathNotFound(path.to_string()))
}

/// Splits `path` into the observable object to attach to and the key to
/// observe on it. The split is at the `*` if there is one, otherwise at the
/// last `.`.
pub fn tuple_for_property_path(root: &Value, path: &str) -> Option<(Object, String)> {
  let stop = path.find('*').or_else(|| path.rfind('.'));
  let (prefix, key) = match stop {
    Some(stop) => (&path[..stop], &path[stop + 1..]),
    None => ("", path),
  };
  if key.is_empty() {
    return None;
  }
  let target = object_for_property_path(root, prefix)?.as_observable()?;
  Some((target, key.to_string()))
}

/// In-place assignment inside a plain JSON document. Intermediate objects
/// are created as needed; array hops must already exist. Returns whether the
/// value was stored.
pub fn set_json_path(json: &mut serde_json::Value, path: &str, value: serde_json::Value) -> bool {
  let indexs = segments(path);
  let Some((last, parents)) = indexs.split_last() else {
    return false;
  };
  let mut json = json;
  for index in parents {
    json = match json {
      serde_json::Value::Array(items) if is_index(index) => {
        match index.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
          Some(item) => item,
          None => return false,
        }
      }
      serde_json::Value::Object(map) => map
        .entry(index.to_string())
        .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new())),
      _ => return false,
    };
  }
  match json {
    serde_json::Value::Array(items) if is_index(last) => {
      match last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
        Some(slot) => {
          *slot = value;
          true
        }
        None => false,
      }
    }
    serde_json::Value::Object(map) => {
      map.insert(last.to_string(), value);
      true
    }
    _ => false,
  }
}
