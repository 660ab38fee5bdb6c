//! Pending observer deliveries, deduplicated per `(object, key, observer)`.

use std::collections::HashMap;
use std::rc::Weak;

use crate::observable::{Object, ObjectCell, ObjectId};
use crate::observer::{Change, Observer, ObserverRecord};
use crate::path;
use crate::run_loop::guarded;
use crate::value::Value;

struct Entry {
  object: Weak<ObjectCell>,
  key: String,
  previous: Option<Value>,
  records: Vec<ObserverRecord>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FireStats {
  pub fired: usize,
  pub failed: usize,
}

/// Insertion-ordered multi-map from `(object, key)` to the observers waiting
/// to hear about that change.
///
/// A flush works on a snapshot taken with [`ObserverSet::take`]; anything
/// added while the snapshot fires lands in the (now empty) live set and is
/// delivered by the next pass.
#[derive(Default)]
pub struct ObserverSet {
  entries: Vec<Entry>,
  index: HashMap<(ObjectId, String), usize>,
}

impl ObserverSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Queues a delivery. Returns false if the same observer is already queued
  /// for this `(object, key)`.
  pub(crate) fn add(&mut self, object: &Object, key: &str, previous: Option<Value>, record: ObserverRecord) -> bool {
    let slot = (object.id(), key.to_string());
    let position = match self.index.get(&slot) {
      Some(position) => *position,
      None => {
        self.entries.push(Entry {
          object: std::rc::Rc::downgrade(&object.0),
          key: key.to_string(),
          previous: None,
          records: vec![],
        });
        self.index.insert(slot, self.entries.len() - 1);
        self.entries.len() - 1
      }
    };
    let entry = &mut self.entries[position];
    if entry.previous.is_none() {
      entry.previous = previous;
    }
    if entry.records.iter().any(|queued| queued.same_as(&record)) {
      return false;
    }
    entry.records.push(record);
    true
  }

  /// Drops a queued delivery of `observer` for `(object, key)`.
  pub(crate) fn remove(&mut self, object: ObjectId, key: &str, observer: &Observer) -> bool {
    let Some(position) = self.index.get(&(object, key.to_string())) else {
      return false;
    };
    let records = &mut self.entries[*position].records;
    let before = records.len();
    records.retain(|record| !record.observer.same_as(observer));
    records.len() != before
  }

  /// Number of queued deliveries.
  pub fn len(&self) -> usize {
    self.entries.iter().map(|entry| entry.records.len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.iter().all(|entry| entry.records.is_empty())
  }

  pub fn clear(&mut self) {
    self.entries.clear();
    self.index.clear();
  }

  pub(crate) fn take(&mut self) -> ObserverSet {
    std::mem::take(self)
  }

  /// Delivers every queued change. Observers removed since they were queued
  /// are skipped; a panicking observer is counted and the rest still run.
  pub(crate) fn fire(self, catch_panics: bool) -> FireStats {
    let mut stats = FireStats::default();
    for entry in self.entries {
      if !entry.records.iter().any(ObserverRecord::is_live) {
        continue;
      }
      let Some(cell) = entry.object.upgrade() else { continue };
      let sender = Object(cell);
      let value = path::get_path(&Value::Object(sender.clone()), &entry.key);
      let revision = sender.revision();
      for record in entry.records {
        if !record.is_live() {
          continue;
        }
        let observer = &record.observer;
        if observer.one_shot {
          sender.remove_observer(&entry.key, observer);
          sender.remove_key_observer(crate::observable::ANY_KEY, observer);
          record.kill();
        }
        let change = Change {
          sender: sender.clone(),
          key: entry.key.clone(),
          value: value.clone(),
          previous: entry.previous.clone(),
          context: observer.context.clone(),
          revision,
        };
        log::trace!("notify {:?} of {}.{} = {}", observer, sender.id(), entry.key, change.value);
        stats.fired += 1;
        let callback = observer.callback.clone();
        if !guarded(catch_panics, || callback(&change)) {
          stats.failed += 1;
          log::error!("observer {:?} panicked on {}.{}", observer, sender.id(), entry.key);
        }
      }
    }
    stats
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::run_loop::RunLoop;

  #[test]
  fn remove_drops_only_the_matching_delivery() {
    let run_loop = RunLoop::new();
    let obj = run_loop.create_object(serde_json::json!({ "a": 1 }));
    let first = Observer::from_fn(|_| {});
    let second = Observer::from_fn(|_| {});
    let mut set = ObserverSet::new();
    assert!(set.add(&obj, "a", None, ObserverRecord::new(first.clone())));
    assert!(!set.add(&obj, "a", None, ObserverRecord::new(first.clone())));
    assert!(set.add(&obj, "a", None, ObserverRecord::new(second.clone())));
    assert_eq!(set.len(), 2);

    assert!(set.remove(obj.id(), "a", &first));
    assert!(!set.remove(obj.id(), "a", &first));
    assert!(!set.remove(obj.id(), "b", &second));
    assert_eq!(set.len(), 1);
    assert!(set.remove(obj.id(), "a", &second));
    assert!(set.is_empty());
  }
}
