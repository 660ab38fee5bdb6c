//! Key-value observation with a run loop that coalesces change notifications.
//!
//! Objects hold properties as [`Value`]s (plain `serde_json` data or handles to
//! other observable objects and lists). Observers attach to keys or property
//! paths, bindings keep two paths in sync, and a [`RunLoop`] batches every
//! change made between `begin()` and `end()` into a single flush:
//!
//! 1. pending property changes are collected from dirty objects,
//! 2. observers waiting for an unresolvable path are retried,
//! 3. observers fire, once per `(object, key, observer)`,
//! 4. bindings sync,
//! 5. `invoke_once` / `invoke_last` tasks run,
//! 6. due timers fire.
//!
//! Anything those steps change is handled by another pass of the same flush,
//! up to [`Config::max_flush_passes`].

pub(crate) mod array;
pub(crate) mod binding;
pub(crate) mod chain;
pub mod config;
pub(crate) mod enumerable;
pub mod error;
pub mod index_set;
pub(crate) mod observable;
pub(crate) mod observer;
pub mod observer_queue;
pub mod observer_set;
pub mod path;
pub(crate) mod range_observer;
pub(crate) mod run_loop;
pub(crate) mod tasks;
pub(crate) mod value;

pub use array::{ArrayChange, ArrayObserver, List};
pub use binding::{Binding, BindingState, Direction, Transform, MULTIPLE_PLACEHOLDER};
pub use config::Config;
pub use enumerable::{Enumerable, Objects};
pub use error::{Error, Result};
pub use index_set::IndexSet;
pub use observable::{Computed, Object, ObjectId};
pub use observer::{Change, Observer, TargetId};
pub use range_observer::{RangeChange, RangeObserver};
pub use run_loop::{FlushReport, RunLoop};
pub use tasks::{Clock, ManualClock, SystemClock, TaskHandle};
pub use value::Value;

/// Read access by key and by property path.
pub trait Gettable {
  fn get(&self, key: &str) -> Value;

  fn get_path(&self, path: &str) -> Value {
    let segments = path::segments(path);
    match segments.split_first() {
      Some((first, rest)) => path::walk(self.get(first), rest),
      None => Value::NULL,
    }
  }
}

/// Write access by key and by property path.
pub trait Settable {
  fn set(&self, key: &str, value: Value) -> Result<()>;

  fn set_path(&self, path: &str, value: Value) -> Result<()>;
}

impl Gettable for Object {
  fn get(&self, key: &str) -> Value {
    Object::get(self, key)
  }
}

impl Settable for Object {
  fn set(&self, key: &str, value: Value) -> Result<()> {
    Object::set(self, key, value)
  }

  fn set_path(&self, path: &str, value: Value) -> Result<()> {
    Object::set_path(self, path, value)
  }
}

impl Gettable for List {
  fn get(&self, key: &str) -> Value {
    List::get(self, key)
  }
}

impl Settable for List {
  fn set(&self, key: &str, value: Value) -> Result<()> {
    self.entity().set(key, value)
  }

  fn set_path(&self, path: &str, value: Value) -> Result<()> {
    path::set_path(&Value::List(self.clone()), path, value)
  }
}

impl Gettable for serde_json::Value {
  fn get(&self, key: &str) -> Value {
    path::json_get(self, key)
  }
}

impl Gettable for Value {
  fn get(&self, key: &str) -> Value {
    match self {
      Value::Json(json) => path::json_get(json, key),
      Value::Object(obj) => obj.get(key),
      Value::List(list) => list.get(key),
    }
  }

  fn get_path(&self, path: &str) -> Value {
    path::get_path(self, path)
  }
}

impl Settable for Value {
  fn set(&self, key: &str, value: Value) -> Result<()> {
    match self {
      Value::Object(obj) => obj.set(key, value),
      Value::List(list) => list.entity().set(key, value),
      Value::Json(_) => {
        log::debug!("ignoring set of `{}` on a plain value", key);
        Ok(())
      }
    }
  }

  fn set_path(&self, path: &str, value: Value) -> Result<()> {
    path::set_path(self, path, value)
  }
}
