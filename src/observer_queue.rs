//! Observers declared against paths that cannot be resolved yet.
//!
//! A binding to `App.selection.name` may be connected before `App.selection`
//! exists. Its observer waits here and is attached as soon as the path
//! resolves, which the run loop checks on every flush pass.
//!
//! Attached path observers are remembered with the object they landed on, so
//! removal detaches from that object even after the path has moved on.

use std::rc::{Rc, Weak};

use crate::observable::{Object, ObjectCell, ObjectId};
use crate::observer::Observer;
use crate::path;
use crate::run_loop::RunLoop;
use crate::value::Value;

pub(crate) struct QueuedObserver {
  root: Weak<ObjectCell>,
  root_id: ObjectId,
  path: String,
  observer: Observer,
}

impl QueuedObserver {
  fn is(&self, root: ObjectId, path: &str, observer: &Observer) -> bool {
    self.root_id == root && self.path == path && self.observer.same_as(observer)
  }
}

// a path observer that resolved, and where
struct AttachedObserver {
  root_id: ObjectId,
  path: String,
  observer: Observer,
  target: Weak<ObjectCell>,
  key: String,
}

#[derive(Default)]
pub struct ObserverQueue {
  entries: Vec<QueuedObserver>,
  attached: Vec<AttachedObserver>,
}

impl ObserverQueue {
  pub(crate) fn push(&mut self, root: &Object, path: &str, observer: Observer) -> bool {
    if self.entries.iter().any(|entry| entry.is(root.id(), path, &observer)) {
      return false;
    }
    self.entries.push(QueuedObserver {
      root: Rc::downgrade(&root.0),
      root_id: root.id(),
      path: path.to_string(),
      observer,
    });
    true
  }

  pub(crate) fn cancel(&mut self, root: ObjectId, path: &str, observer: &Observer) -> bool {
    let before = self.entries.len();
    self.entries.retain(|entry| !entry.is(root, path, observer));
    self.entries.len() != before
  }

  fn record(&mut self, root: ObjectId, path: &str, observer: &Observer, target: &Object, key: &str) {
    self.attached.retain(|attached| attached.target.strong_count() > 0);
    let known = self.attached.iter().any(|attached| {
      attached.root_id == root
        && attached.path == path
        && attached.observer.same_as(observer)
        && attached.key == key
        && attached.target.ptr_eq(&Rc::downgrade(&target.0))
    });
    if !known {
      self.attached.push(AttachedObserver {
        root_id: root,
        path: path.to_string(),
        observer: observer.clone(),
        target: Rc::downgrade(&target.0),
        key: key.to_string(),
      });
    }
  }

  /// Drops the records of `observer` on `path` and returns where it was
  /// attached. `None` when nothing was recorded.
  fn forget(&mut self, root: ObjectId, path: &str, observer: &Observer) -> Option<Vec<(Option<Object>, String)>> {
    let mut found = vec![];
    self.attached.retain(|attached| {
      let matches = attached.root_id == root && attached.path == path && attached.observer.same_as(observer);
      if matches {
        found.push((attached.target.upgrade().map(Object), attached.key.clone()));
      }
      !matches
    });
    if found.is_empty() {
      None
    } else {
      Some(found)
    }
  }

  /// Number of observers still waiting for their path.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn clear(&mut self) {
    self.entries.clear();
    self.attached.clear();
  }

  fn take(&mut self) -> Vec<QueuedObserver> {
    std::mem::take(&mut self.entries)
  }

  // keeps leftovers ahead of anything queued while they were being retried
  fn restore(&mut self, mut leftovers: Vec<QueuedObserver>) {
    leftovers.append(&mut self.entries);
    self.entries = leftovers;
  }
}

impl RunLoop {
  /// Attaches `observer` to the object and key `path` resolves to from
  /// `root` (the globals object when `None`), or queues it until the path
  /// resolves.
  pub fn add_observer_for_path(&self, root: Option<&Object>, path: &str, observer: Observer) {
    let root = root.cloned().unwrap_or_else(|| self.globals());
    match path::tuple_for_property_path(&Value::Object(root.clone()), path) {
      Some((target, key)) => {
        self.0.queue.borrow_mut().record(root.id(), path, &observer, &target, &key);
        target.add_observer(&key, observer);
      }
      None => {
        log::debug!("queue observer for `{}` on {}", path, root.id());
        self.0.queue.borrow_mut().push(&root, path, observer);
      }
    }
  }

  pub fn remove_observer_for_path(&self, root: Option<&Object>, path: &str, observer: &Observer) {
    let root = root.cloned().unwrap_or_else(|| self.globals());
    let attached = {
      let mut queue = self.0.queue.borrow_mut();
      queue.cancel(root.id(), path, observer);
      queue.forget(root.id(), path, observer)
    };
    match attached {
      Some(attached) => {
        for (target, key) in attached {
          if let Some(target) = target {
            target.remove_observer(&key, observer);
          }
        }
      }
      None => {
        if let Some((target, key)) = path::tuple_for_property_path(&Value::Object(root.clone()), path) {
          target.remove_observer(&key, observer);
        }
      }
    }
  }

  /// Retries queued observers. With a `candidate`, only entries rooted at or
  /// resolving to that object are attached. Returns how many were attached;
  /// a second call with nothing changed attaches none.
  pub fn flush_observer_queue(&self, candidate: Option<&Object>) -> usize {
    let pending = self.0.queue.borrow_mut().take();
    if pending.is_empty() {
      return 0;
    }
    let mut attached = 0;
    let mut leftovers = vec![];
    for entry in pending {
      let Some(root) = entry.root.upgrade().map(Object) else {
        log::debug!("drop queued observer for `{}`, root is gone", entry.path);
        continue;
      };
      match path::tuple_for_property_path(&Value::Object(root.clone()), &entry.path) {
        Some((target, key)) if candidate.map_or(true, |c| *c == root || *c == target) => {
          log::debug!("attach queued observer for `{}` on {}", entry.path, target.id());
          let hook = entry.observer.on_attach.clone();
          self.0.queue.borrow_mut().record(entry.root_id, &entry.path, &entry.observer, &target, &key);
          target.add_observer(&key, entry.observer);
          attached += 1;
          if let Some(hook) = hook {
            hook();
          }
        }
        _ => leftovers.push(entry),
      }
    }
    self.0.queue.borrow_mut().restore(leftovers);
    attached
  }

  pub fn queued_observers(&self) -> usize {
    self.0.queue.borrow().len()
  }
}
