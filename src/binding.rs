//! Bindings keep the value at one property path in sync with another.
//!
//! ```ignore
//! let binding = Binding::from(&controller, "selection.name")
//!   .to(&label, "text")
//!   .one_way()
//!   .not_empty("(none)")
//!   .connect(&run_loop)?;
//! ```
//!
//! A binding is two observers and two "changed" flags. Observers only raise
//! a flag and schedule the binding; the value is copied when the run loop
//! flushes bindings, after all plain observers of the pass. Within a cycle
//! the last value wins, and when both sides changed the `from` side wins.
//!
//! # Invariants
//!
//! 1. Writes happen only during a flush, never inside the setter that caused
//!    them.
//! 2. A write is skipped when the destination already holds an equal value.
//! 3. The notification caused by a binding's own write is swallowed, so a
//!    value never travels back to the side it came from in the same flush.
//! 4. A connected binding is owned by its run loop until `disconnect()`.
//! 5. When a side whose path did not resolve at connect time resolves later,
//!    the `from` value is copied across as if it had just changed.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::error::Result;
use crate::observable::{Object, ObjectCell};
use crate::observer::{Observer, TargetId};
use crate::path;
use crate::run_loop::{self, RunLoop};
use crate::value::Value;

/// What [`Binding::single`] produces for a collection with several items.
pub const MULTIPLE_PLACEHOLDER: &str = "@@MULT@@";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  /// from -> to
  Forward,
  /// to -> from
  Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
  Disconnected,
  Connecting,
  Connected,
}

pub type Transform = Rc<dyn Fn(Value, Direction) -> Value>;

#[derive(Clone, Default)]
struct Endpoint {
  root: Option<Weak<ObjectCell>>,
  path: String,
}

impl Endpoint {
  fn new(root: Option<&Object>, path: &str) -> Self {
    Self {
      root: root.map(|obj| Rc::downgrade(&obj.0)),
      path: path.to_string(),
    }
  }

  fn root(&self) -> Option<Object> {
    self.root.as_ref().and_then(Weak::upgrade).map(Object)
  }
}

#[derive(Default)]
struct SyncFlags {
  from_changed: bool,
  to_changed: bool,
  ignore_from: bool,
  ignore_to: bool,
  scheduled: bool,
}

pub(crate) struct BindingInner {
  id: TargetId,
  from: RefCell<Endpoint>,
  to: RefCell<Endpoint>,
  one_way: Cell<bool>,
  transforms: RefCell<Vec<Transform>>,
  state: Cell<BindingState>,
  flags: RefCell<SyncFlags>,
  observers: RefCell<Vec<(Endpoint, Observer)>>,
  run_loop: RefCell<Weak<run_loop::Inner>>,
}

impl BindingInner {
  pub(crate) fn id(&self) -> TargetId {
    self.id
  }

  fn run_loop(&self) -> Option<RunLoop> {
    self.run_loop.borrow().upgrade().map(RunLoop::from_inner)
  }

  pub(crate) fn mark_scheduled(&self) -> bool {
    !std::mem::replace(&mut self.flags.borrow_mut().scheduled, true)
  }

  pub(crate) fn clear_scheduled(&self) {
    self.flags.borrow_mut().scheduled = false;
  }

  pub(crate) fn clear_suppression(&self) {
    let mut flags = self.flags.borrow_mut();
    flags.ignore_from = false;
    flags.ignore_to = false;
  }

  fn side_did_change(self: &Rc<Self>, side: Direction) {
    if self.state.get() != BindingState::Connected {
      return;
    }
    {
      let mut guard = self.flags.borrow_mut();
      let flags = &mut *guard;
      let (ignore, changed) = match side {
        Direction::Forward => (&mut flags.ignore_from, &mut flags.from_changed),
        Direction::Reverse => (&mut flags.ignore_to, &mut flags.to_changed),
      };
      if std::mem::take(ignore) {
        log::trace!("binding {:?} ignores its own write ({:?})", self.id, side);
        return;
      }
      *changed = true;
    }
    if let Some(run_loop) = self.run_loop() {
      run_loop.schedule_binding(self.clone());
    }
  }

  fn apply(&self, mut value: Value, direction: Direction) -> Value {
    let transforms = self.transforms.borrow().clone();
    for transform in transforms.iter() {
      value = transform(value, direction);
    }
    value
  }

  /// Copies the pending side across. Returns whether a value was written.
  pub(crate) fn sync(&self) -> Result<bool> {
    let (from_changed, to_changed) = {
      let mut flags = self.flags.borrow_mut();
      (std::mem::take(&mut flags.from_changed), std::mem::take(&mut flags.to_changed))
    };
    if self.state.get() != BindingState::Connected {
      return Ok(false);
    }
    let from = self.from.borrow().clone();
    let to = self.to.borrow().clone();
    let (Some(from_root), Some(to_root)) = (from.root(), to.root()) else {
      log::debug!("binding {:?} lost a root object", self.id);
      return Ok(false);
    };
    let from_root = Value::Object(from_root);
    let to_root = Value::Object(to_root);
    let two_way = !self.one_way.get();

    if from_changed {
      let value = self.apply(path::get_path(&from_root, &from.path), Direction::Forward);
      if path::get_path(&to_root, &to.path) == value {
        return Ok(false);
      }
      log::trace!("binding {:?}: {} -> {} = {}", self.id, from.path, to.path, value);
      self.flags.borrow_mut().ignore_to = two_way;
      if let Err(err) = path::set_path(&to_root, &to.path, value) {
        self.flags.borrow_mut().ignore_to = false;
        return Err(err);
      }
      Ok(true)
    } else if to_changed && two_way {
      let value = self.apply(path::get_path(&to_root, &to.path), Direction::Reverse);
      if path::get_path(&from_root, &from.path) == value {
        return Ok(false);
      }
      log::trace!("binding {:?}: {} <- {} = {}", self.id, from.path, to.path, value);
      self.flags.borrow_mut().ignore_from = true;
      if let Err(err) = path::set_path(&from_root, &from.path, value) {
        self.flags.borrow_mut().ignore_from = false;
        return Err(err);
      }
      Ok(true)
    } else {
      Ok(false)
    }
  }

  pub(crate) fn disconnect_from(&self, run_loop: &RunLoop) {
    if self.state.get() == BindingState::Disconnected {
      return;
    }
    self.state.set(BindingState::Disconnected);
    let observers = std::mem::take(&mut *self.observers.borrow_mut());
    for (endpoint, observer) in observers {
      if let Some(root) = endpoint.root() {
        run_loop.remove_observer_for_path(Some(&root), &endpoint.path, &observer);
      }
    }
    *self.flags.borrow_mut() = SyncFlags::default();
    log::debug!("binding {:?} disconnected", self.id);
  }
}

/// A synchronization edge between two property paths. Configure it with the
/// builder methods, then [`connect`](Binding::connect) it.
#[derive(Clone)]
pub struct Binding(Rc<BindingInner>);

impl Binding {
  fn with_from(from: Endpoint) -> Self {
    Binding(Rc::new(BindingInner {
      id: TargetId::unique(),
      from: RefCell::new(from),
      to: RefCell::new(Endpoint::default()),
      one_way: Cell::new(false),
      transforms: RefCell::new(vec![]),
      state: Cell::new(BindingState::Disconnected),
      flags: RefCell::new(SyncFlags::default()),
      observers: RefCell::new(vec![]),
      run_loop: RefCell::new(Weak::new()),
    }))
  }

  pub fn from(root: &Object, path: &str) -> Self {
    Self::with_from(Endpoint::new(Some(root), path))
  }

  /// Source path resolved from the run loop's globals object.
  pub fn from_path(path: &str) -> Self {
    Self::with_from(Endpoint::new(None, path))
  }

  pub fn to(self, root: &Object, path: &str) -> Self {
    *self.0.to.borrow_mut() = Endpoint::new(Some(root), path);
    self
  }

  pub fn to_path(self, path: &str) -> Self {
    *self.0.to.borrow_mut() = Endpoint::new(None, path);
    self
  }

  pub fn one_way(self) -> Self {
    self.0.one_way.set(true);
    self
  }

  pub fn transform<F>(self, transform: F) -> Self
  where F: Fn(Value, Direction) -> Value + 'static
  {
    self.0.transforms.borrow_mut().push(Rc::new(transform));
    self
  }

  pub fn bool(self) -> Self {
    self.transform(|value, _| Value::from(value.truthy()))
  }

  pub fn not(self) -> Self {
    self.transform(|value, _| Value::from(!value.truthy()))
  }

  pub fn is_null(self) -> Self {
    self.transform(|value, _| Value::from(value.is_null()))
  }

  pub fn not_null(self, placeholder: impl Into<Value>) -> Self {
    let placeholder = placeholder.into();
    self.transform(move |value, _| if value.is_null() { placeholder.clone() } else { value })
  }

  pub fn not_empty(self, placeholder: impl Into<Value>) -> Self {
    let placeholder = placeholder.into();
    self.transform(move |value, _| if value.is_empty() { placeholder.clone() } else { value })
  }

  /// Collections collapse to their only item, null when empty, or
  /// [`MULTIPLE_PLACEHOLDER`].
  pub fn single(self) -> Self {
    self.transform(|value, _| {
      let items: Vec<Value> = match &value {
        Value::List(list) => list.to_vec(),
        Value::Json(serde_json::Value::Array(items)) => items.iter().cloned().map(Value::Json).collect(),
        _ => return value,
      };
      match items.len() {
        0 => Value::NULL,
        1 => items.into_iter().next().unwrap_or_default(),
        _ => Value::from(MULTIPLE_PLACEHOLDER),
      }
    })
  }

  /// Plain values are wrapped into a one-item JSON array, null into an empty one.
  pub fn multiple(self) -> Self {
    self.transform(|value, _| match value {
      Value::Json(serde_json::Value::Null) => Value::Json(serde_json::Value::Array(vec![])),
      Value::Json(serde_json::Value::Array(_)) => value,
      Value::Json(json) => Value::Json(serde_json::Value::Array(vec![json])),
      other => other,
    })
  }

  pub fn state(&self) -> BindingState {
    self.0.state.get()
  }

  pub fn is_connected(&self) -> bool {
    self.state() == BindingState::Connected
  }

  pub fn is_one_way(&self) -> bool {
    self.0.one_way.get()
  }

  /// Attaches the observers and schedules an initial from -> to sync. Outside
  /// a run loop bracket the sync happens before this returns.
  pub fn connect(self, run_loop: &RunLoop) -> Result<Self> {
    if self.state() != BindingState::Disconnected {
      log::warn!("binding {:?} is already connected", self.0.id);
      return Ok(self);
    }
    self.0.state.set(BindingState::Connecting);
    *self.0.run_loop.borrow_mut() = Rc::downgrade(&run_loop.0);

    let globals = Rc::downgrade(&run_loop.globals().0);
    for endpoint in [&self.0.from, &self.0.to] {
      let mut endpoint = endpoint.borrow_mut();
      if endpoint.root.is_none() {
        endpoint.root = Some(globals.clone());
      }
    }
    for side in [Direction::Forward, Direction::Reverse] {
      if side == Direction::Reverse && self.is_one_way() {
        continue;
      }
      let endpoint = match side {
        Direction::Forward => self.0.from.borrow().clone(),
        Direction::Reverse => self.0.to.borrow().clone(),
      };
      let weak = Rc::downgrade(&self.0);
      let method = match side {
        Direction::Forward => "from_did_change",
        Direction::Reverse => "to_did_change",
      };
      let attached = weak.clone();
      let observer = Observer::new(self.0.id, method, move |_| {
        if let Some(binding) = weak.upgrade() {
          binding.side_did_change(side);
        }
      })
      .on_attach(move || {
        if let Some(binding) = attached.upgrade() {
          binding.side_did_change(Direction::Forward);
        }
      });
      let root = endpoint.root();
      run_loop.add_observer_for_path(root.as_ref(), &endpoint.path, observer.clone());
      self.0.observers.borrow_mut().push((endpoint, observer));
    }

    run_loop.register_binding(self.0.clone());
    self.0.state.set(BindingState::Connected);
    log::debug!(
      "binding {:?} connected: {} -> {}{}",
      self.0.id,
      self.0.from.borrow().path,
      self.0.to.borrow().path,
      if self.is_one_way() { " (one way)" } else { "" }
    );
    self.0.flags.borrow_mut().from_changed = true;
    run_loop.schedule_binding(self.0.clone());
    run_loop.autorun()?;
    Ok(self)
  }

  pub fn disconnect(&self) {
    let Some(run_loop) = self.0.run_loop() else {
      self.0.state.set(BindingState::Disconnected);
      return;
    };
    self.0.disconnect_from(&run_loop);
    run_loop.unregister_binding(self.0.id);
  }

  /// Copies the pending side across now, outside the run loop's flush.
  pub fn sync(&self) -> Result<bool> {
    self.0.sync()
  }
}

impl std::fmt::Debug for Binding {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Binding")
      .field("id", &self.0.id)
      .field("from", &self.0.from.borrow().path)
      .field("to", &self.0.to.borrow().path)
      .field("one_way", &self.0.one_way.get())
      .field("state", &self.0.state.get())
      .finish()
  }
}
