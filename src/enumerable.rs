use std::collections::BTreeMap;

use crate::array::List;
use crate::value::Value;
use crate::Gettable;

/// Uniform iteration over anything indexable.
///
/// Only `length` and `object_at` are required; the rest is built on them.
/// The `*_property` helpers read a key from each item, so they work on lists
/// of observable objects and of plain JSON alike.
pub trait Enumerable {
  fn length(&self) -> usize;

  fn object_at(&self, index: usize) -> Option<Value>;

  /// Cursor-style access: the item at `index` or `None` past the end.
  fn next_object(&self, index: usize) -> Option<Value> {
    if index < self.length() {
      self.object_at(index)
    } else {
      None
    }
  }

  fn objects(&self) -> Objects<'_, Self> {
    Objects { source: self, cursor: 0 }
  }

  fn for_each<F>(&self, mut f: F)
  where F: FnMut(&Value, usize)
  {
    for (index, item) in self.objects().enumerate() {
      f(&item, index);
    }
  }

  fn map<F>(&self, mut f: F) -> Vec<Value>
  where F: FnMut(&Value, usize) -> Value
  {
    self.objects().enumerate().map(|(index, item)| f(&item, index)).collect()
  }

  fn filter<F>(&self, mut f: F) -> Vec<Value>
  where F: FnMut(&Value, usize) -> bool
  {
    self.objects().enumerate().filter(|(index, item)| f(item, *index)).map(|(_, item)| item).collect()
  }

  fn find<F>(&self, mut f: F) -> Option<Value>
  where F: FnMut(&Value, usize) -> bool
  {
    self.objects().enumerate().find(|(index, item)| f(item, *index)).map(|(_, item)| item)
  }

  fn reduce<A, F>(&self, initial: A, mut f: F) -> A
  where F: FnMut(A, &Value, usize) -> A
  {
    self.objects().enumerate().fold(initial, |acc, (index, item)| f(acc, &item, index))
  }

  fn every<F>(&self, mut f: F) -> bool
  where F: FnMut(&Value, usize) -> bool
  {
    self.objects().enumerate().all(|(index, item)| f(&item, index))
  }

  fn some<F>(&self, mut f: F) -> bool
  where F: FnMut(&Value, usize) -> bool
  {
    self.objects().enumerate().any(|(index, item)| f(&item, index))
  }

  fn index_of(&self, value: &Value) -> Option<usize> {
    self.objects().position(|item| item == *value)
  }

  fn map_property(&self, key: &str) -> Vec<Value> {
    self.map(|item, _| item.get(key))
  }

  /// Items whose `key` equals `value`, or is truthy when `value` is `None`.
  fn filter_property(&self, key: &str, value: Option<&Value>) -> Vec<Value> {
    self.filter(|item, _| matches_property(item, key, value))
  }

  fn find_property(&self, key: &str, value: Option<&Value>) -> Option<Value> {
    self.find(|item, _| matches_property(item, key, value))
  }

  fn every_property(&self, key: &str, value: Option<&Value>) -> bool {
    self.every(|item, _| matches_property(item, key, value))
  }

  fn some_property(&self, key: &str, value: Option<&Value>) -> bool {
    self.some(|item, _| matches_property(item, key, value))
  }

  /// Buckets items by the string form of their `key`.
  fn group_by(&self, key: &str) -> BTreeMap<String, Vec<Value>> {
    let mut groups: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for item in self.objects() {
      let group = match item.get(key) {
        Value::Json(serde_json::Value::String(s)) => s,
        other => other.to_string(),
      };
      groups.entry(group).or_default().push(item);
    }
    groups
  }

  /// Invokes `method` on every observable item and collects the results.
  /// Plain items yield null.
  fn invoke(&self, method: &str, args: &[Value]) -> Vec<Value> {
    self.map(|item, _| match item.as_observable() {
      Some(object) => object.invoke(method, args),
      None => Value::NULL,
    })
  }
}

fn matches_property(item: &Value, key: &str, value: Option<&Value>) -> bool {
  let actual = item.get(key);
  match value {
    Some(expected) => actual == *expected,
    None => actual.truthy(),
  }
}

/// Iterator over an [`Enumerable`]. Reads each index on demand, so it sees
/// mutations made while iterating.
pub struct Objects<'a, E: ?Sized> {
  source: &'a E,
  cursor: usize,
}

impl<E: Enumerable + ?Sized> Iterator for Objects<'_, E> {
  type Item = Value;

  fn next(&mut self) -> Option<Value> {
    let item = self.source.next_object(self.cursor)?;
    self.cursor += 1;
    Some(item)
  }
}

impl Enumerable for List {
  fn length(&self) -> usize {
    self.len()
  }

  fn object_at(&self, index: usize) -> Option<Value> {
    List::object_at(self, index)
  }
}

impl Enumerable for [Value] {
  fn length(&self) -> usize {
    self.len()
  }

  fn object_at(&self, index: usize) -> Option<Value> {
    self.get(index).cloned()
  }
}

impl Enumerable for Vec<Value> {
  fn length(&self) -> usize {
    self.len()
  }

  fn object_at(&self, index: usize) -> Option<Value> {
    self.get(index).cloned()
  }
}
