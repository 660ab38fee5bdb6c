use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::chain::ChainObserver;
use crate::error::{Error, Result};
use crate::observer::{next_id, Observer, ObserverRecord, TargetId};
use crate::path;
use crate::run_loop::{self, RunLoop};
use crate::value::Value;

/// Key observers registered under this name fire for every key.
pub(crate) const ANY_KEY: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) u64);

impl std::fmt::Display for ObjectId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "object#{}", self.0)
  }
}

type Accessor = Rc<dyn Fn(&Object, &str, Option<Value>) -> Value>;
type Method = Rc<dyn Fn(&Object, &[Value]) -> Value>;
type UnknownProperty = Rc<dyn Fn(&Object, &str) -> Value>;

/// A computed property.
///
/// The accessor receives the key and, for a `set`, the proposed value; what it
/// returns is the property's value (and, if cacheable, what gets cached until
/// one of its dependent keys changes).
#[derive(Clone)]
pub struct Computed {
  accessor: Accessor,
  cacheable: bool,
  dependent_keys: Vec<String>,
}

impl Computed {
  pub fn new<F>(accessor: F) -> Self
  where F: Fn(&Object, &str, Option<Value>) -> Value + 'static
  {
    Self {
      accessor: Rc::new(accessor),
      cacheable: false,
      dependent_keys: vec![],
    }
  }

  /// A read-only computed property. Sets are ignored.
  pub fn getter<F>(getter: F) -> Self
  where F: Fn(&Object) -> Value + 'static
  {
    Self::new(move |obj, _, _| getter(obj))
  }

  pub fn cacheable(mut self) -> Self {
    self.cacheable = true;
    self
  }

  /// Keys (or paths) whose change invalidates this property.
  pub fn property<I, S>(mut self, keys: I) -> Self
  where I: IntoIterator<Item = S>, S: Into<String>
  {
    self.dependent_keys.extend(keys.into_iter().map(Into::into));
    self
  }
}

#[derive(Default)]
struct ObjectState {
  props: HashMap<String, Value>,
  computed: HashMap<String, Computed>,
  cache: HashMap<String, Value>,
  methods: HashMap<String, Method>,
  unknown_property: Option<UnknownProperty>,
  // key -> keys that must be invalidated when it changes
  dependents: HashMap<String, Vec<String>>,
  observers: HashMap<String, Vec<ObserverRecord>>,
  chains: Vec<Rc<ChainObserver>>,
  change_depth: usize,
  pending: Vec<String>,
  previous: HashMap<String, Value>,
  queued: bool,
  revision: u64,
  frozen: bool,
  destroyed: bool,
}

impl ObjectState {
  /// Drops cached values for `key` and everything that transitively depends
  /// on it. Returns all affected keys, `key` first.
  fn invalidate(&mut self, key: &str, keep_cache: bool) -> Vec<String> {
    if !keep_cache {
      self.cache.remove(key);
    }
    let mut affected = vec![key.to_string()];
    let mut cursor = 0;
    while cursor < affected.len() {
      let current = affected[cursor].clone();
      cursor += 1;
      let Some(dependents) = self.dependents.get(&current) else { continue };
      for dependent in dependents {
        if !affected.contains(dependent) {
          self.cache.remove(dependent);
          affected.push(dependent.clone());
        }
      }
    }
    affected
  }
}

pub(crate) struct ObjectCell {
  pub(crate) id: ObjectId,
  run_loop: Weak<run_loop::Inner>,
  state: RefCell<ObjectState>,
}

impl Drop for ObjectCell {
  fn drop(&mut self) {
    log::debug!("drop {}", self.id);
    for chain in self.state.get_mut().chains.drain(..) {
      chain.destroy();
    }
  }
}

/// Handle to an observable entity. Clones share the same entity.
#[derive(Clone)]
pub struct Object(pub(crate) Rc<ObjectCell>);

impl Object {
  pub(crate) fn new_in(run_loop: Weak<run_loop::Inner>, props: serde_json::Value) -> Self {
    let props = match props {
      serde_json::Value::Object(map) => map.into_iter().map(|(k, v)| (k, Value::Json(v))).collect(),
      serde_json::Value::Null => HashMap::new(),
      other => {
        log::warn!("object properties must be a JSON object, got {}", other);
        HashMap::new()
      }
    };
    let cell = ObjectCell {
      id: ObjectId(next_id()),
      run_loop,
      state: RefCell::new(ObjectState { props, ..Default::default() }),
    };
    log::debug!("create {}", cell.id);
    Object(Rc::new(cell))
  }

  pub fn id(&self) -> ObjectId {
    self.0.id
  }

  pub fn run_loop(&self) -> Option<RunLoop> {
    self.0.run_loop.upgrade().map(RunLoop::from_inner)
  }

  pub fn revision(&self) -> u64 {
    self.0.state.borrow().revision
  }

  /// Names of the plain (non-computed) properties.
  pub fn keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = self.0.state.borrow().props.keys().cloned().collect();
    keys.sort();
    keys
  }

  pub fn get(&self, key: &str) -> Value {
    enum Lookup {
      Found(Value),
      Compute(Computed),
      Unknown(Option<UnknownProperty>),
    }
    let lookup = {
      let state = self.0.state.borrow();
      if let Some(computed) = state.computed.get(key) {
        match state.cache.get(key) {
          Some(cached) if computed.cacheable => Lookup::Found(cached.clone()),
          _ => Lookup::Compute(computed.clone()),
        }
      } else if let Some(value) = state.props.get(key) {
        Lookup::Found(value.clone())
      } else {
        Lookup::Unknown(state.unknown_property.clone())
      }
    };
    match lookup {
      Lookup::Found(value) => value,
      Lookup::Compute(computed) => {
        let value = (computed.accessor)(self, key, None);
        if computed.cacheable {
          self.0.state.borrow_mut().cache.insert(key.to_string(), value.clone());
        }
        value
      }
      Lookup::Unknown(Some(hook)) => hook(self, key),
      Lookup::Unknown(None) => Value::NULL,
    }
  }

  pub fn get_path(&self, path: &str) -> Value {
    path::get_path(&Value::Object(self.clone()), path)
  }

  pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
    let value = value.into();
    let computed = {
      let state = self.0.state.borrow();
      if state.frozen {
        return Err(Error::Frozen { key: key.to_string() });
      }
      match state.computed.get(key) {
        Some(computed) => Some(computed.clone()),
        None if state.props.get(key) == Some(&value) => return Ok(()),
        None => None,
      }
    };
    self.property_will_change(key);
    match computed {
      Some(computed) => {
        let stored = (computed.accessor)(self, key, Some(value));
        if computed.cacheable {
          self.0.state.borrow_mut().cache.insert(key.to_string(), stored);
          self.property_did_change_with(key, true)
        } else {
          self.property_did_change(key)
        }
      }
      None => {
        self.0.state.borrow_mut().props.insert(key.to_string(), value);
        self.property_did_change(key)
      }
    }
  }

  pub fn set_path(&self, path: &str, value: impl Into<Value>) -> Result<()> {
    path::set_path(&Value::Object(self.clone()), path, value)
  }

  /// Adds `by` to a numeric property. Integers saturate at the `i64` bounds,
  /// floats stay floats, and anything else counts as 0.
  pub fn increment_property(&self, key: &str, by: i64) -> Result<Value> {
    let current = self.get(key);
    let next = match (current.as_i64(), current.as_f64()) {
      (Some(n), _) => Value::from(n.saturating_add(by)),
      (None, Some(f)) => Value::from(f + by as f64),
      (None, None) => Value::from(by),
    };
    self.set(key, next.clone())?;
    Ok(next)
  }

  pub fn decrement_property(&self, key: &str, by: i64) -> Result<Value> {
    self.increment_property(key, by.saturating_neg())
  }

  pub fn toggle_property(&self, key: &str) -> Result<Value> {
    let next = Value::from(!self.get(key).truthy());
    self.set(key, next.clone())?;
    Ok(next)
  }

  /// Records the current value of a plain property so the coming
  /// notification can report it as `previous`.
  pub fn property_will_change(&self, key: &str) {
    let mut guard = self.0.state.borrow_mut();
    let state = &mut *guard;
    if state.previous.contains_key(key) {
      return;
    }
    if let Some(current) = state.props.get(key).or_else(|| state.cache.get(key)) {
      state.previous.insert(key.to_string(), current.clone());
    }
  }

  pub fn property_did_change(&self, key: &str) -> Result<()> {
    self.property_did_change_with(key, false)
  }

  /// Invalidates `key` and its dependents and queues their notification.
  /// With `keep_cache` the cached value of `key` itself survives (it was
  /// just stored by a computed setter).
  pub fn property_did_change_with(&self, key: &str, keep_cache: bool) -> Result<()> {
    let deferred = {
      let mut guard = self.0.state.borrow_mut();
      let state = &mut *guard;
      let affected = state.invalidate(key, keep_cache);
      state.revision += 1;
      for key in affected {
        if !state.pending.contains(&key) {
          state.pending.push(key);
        }
      }
      state.change_depth > 0
    };
    if deferred {
      Ok(())
    } else {
      self.schedule_flush()
    }
  }

  pub fn notify_property_change(&self, key: &str) -> Result<()> {
    self.property_will_change(key);
    self.property_did_change(key)
  }

  pub fn begin_property_changes(&self) {
    self.0.state.borrow_mut().change_depth += 1;
  }

  pub fn end_property_changes(&self) -> Result<()> {
    let flush = {
      let mut state = self.0.state.borrow_mut();
      if state.change_depth == 0 {
        return Err(Error::UnbalancedPropertyChanges(self.id()));
      }
      state.change_depth -= 1;
      state.change_depth == 0 && !state.pending.is_empty()
    };
    if flush {
      self.schedule_flush()
    } else {
      Ok(())
    }
  }

  pub fn is_changing(&self) -> bool {
    self.0.state.borrow().change_depth > 0
  }

  fn schedule_flush(&self) -> Result<()> {
    match self.run_loop() {
      Some(run_loop) => {
        run_loop.mark_dirty(self);
        run_loop.autorun()
      }
      None => Ok(()),
    }
  }

  /// Sets the queued flag; false if the object was already queued.
  pub(crate) fn mark_queued(&self) -> bool {
    let mut state = self.0.state.borrow_mut();
    !std::mem::replace(&mut state.queued, true)
  }

  /// Keys changed since the last flush, with their recorded previous values.
  pub(crate) fn take_pending(&self) -> Vec<(String, Option<Value>)> {
    let mut state = self.0.state.borrow_mut();
    state.queued = false;
    if state.change_depth > 0 {
      return vec![];
    }
    let pending = std::mem::take(&mut state.pending);
    let mut previous = std::mem::take(&mut state.previous);
    pending
      .into_iter()
      .map(|key| {
        let prev = previous.remove(&key);
        (key, prev)
      })
      .collect()
  }

  pub(crate) fn discard_pending(&self) {
    let mut state = self.0.state.borrow_mut();
    state.queued = false;
    state.pending.clear();
    state.previous.clear();
  }

  /// Registrations to notify for a change of `key`, `*` observers included.
  pub(crate) fn observers_for(&self, key: &str) -> Vec<ObserverRecord> {
    let state = self.0.state.borrow();
    let mut records: Vec<ObserverRecord> = state.observers.get(key).cloned().unwrap_or_default();
    if key != ANY_KEY {
      for record in state.observers.get(ANY_KEY).into_iter().flatten() {
        if !records.iter().any(|r| r.same_as(record)) {
          records.push(record.clone());
        }
      }
    }
    records
  }

  /// Observe a key, `*` (every key), a dotted path (chained) or a starred
  /// path. Adding an observer that is already registered for the same path
  /// does nothing.
  pub fn add_observer(&self, path: &str, observer: Observer) {
    if path == ANY_KEY || !(path.contains('.') || path.contains('*')) {
      self.add_key_observer(path, observer);
    } else if path.contains('*') {
      match self.run_loop() {
        Some(run_loop) => run_loop.add_observer_for_path(Some(self), path, observer),
        None => log::warn!("cannot observe `{}` on {} without a run loop", path, self.id()),
      }
    } else {
      let exists = self.0.state.borrow().chains.iter().any(|chain| chain.matches(path, &observer));
      if exists {
        return;
      }
      let chain = ChainObserver::new(self, path, observer);
      self.0.state.borrow_mut().chains.push(chain);
    }
  }

  pub fn remove_observer(&self, path: &str, observer: &Observer) {
    if path == ANY_KEY || !(path.contains('.') || path.contains('*')) {
      self.remove_key_observer(path, observer);
    } else if path.contains('*') {
      if let Some(run_loop) = self.run_loop() {
        run_loop.remove_observer_for_path(Some(self), path, observer);
      }
    } else {
      let removed = {
        let mut state = self.0.state.borrow_mut();
        let index = state.chains.iter().position(|chain| chain.matches(path, observer));
        index.map(|index| state.chains.remove(index))
      };
      if let Some(chain) = removed {
        chain.destroy();
      }
    }
  }

  pub(crate) fn add_key_observer(&self, key: &str, observer: Observer) -> bool {
    let mut state = self.0.state.borrow_mut();
    if state.destroyed {
      log::warn!("ignoring observer on destroyed {}", self.id());
      return false;
    }
    let records = state.observers.entry(key.to_string()).or_default();
    if records.iter().any(|record| record.observer.same_as(&observer)) {
      return false;
    }
    log::trace!("{} observe `{}` -> {:?}", self.id(), key, observer);
    records.push(ObserverRecord::new(observer));
    true
  }

  pub(crate) fn remove_key_observer(&self, key: &str, observer: &Observer) -> bool {
    let mut state = self.0.state.borrow_mut();
    let Some(records) = state.observers.get_mut(key) else {
      return false;
    };
    let Some(index) = records.iter().position(|record| record.observer.same_as(observer)) else {
      return false;
    };
    records.remove(index).kill();
    if records.is_empty() {
      state.observers.remove(key);
    }
    drop(state);
    if let Some(run_loop) = self.run_loop() {
      run_loop.0.observers.borrow_mut().remove(self.id(), key, observer);
    }
    true
  }

  /// Whether anything observes `key` directly (`*` observers excluded).
  pub fn has_observers(&self, key: &str) -> bool {
    self.observer_count(key) > 0
  }

  pub fn observer_count(&self, key: &str) -> usize {
    self.0.state.borrow().observers.get(key).map_or(0, Vec::len)
  }

  /// Declares that `key` must be invalidated whenever one of `dependencies`
  /// changes. Dependencies containing `.` or `*` are observed as paths.
  pub fn register_dependent_key<I, S>(&self, key: &str, dependencies: I)
  where I: IntoIterator<Item = S>, S: AsRef<str>
  {
    for dependency in dependencies {
      let dependency = dependency.as_ref();
      if dependency.contains('.') || dependency.contains('*') {
        let weak = Rc::downgrade(&self.0);
        let dependent = key.to_string();
        let observer = Observer::new(TargetId::from(self), format!("dependent:{}", key), move |_| {
          let Some(cell) = weak.upgrade() else { return };
          if let Err(err) = Object(cell).property_did_change(&dependent) {
            log::warn!("invalidating `{}` failed: {}", dependent, err);
          }
        });
        self.add_observer(dependency, observer);
        continue;
      }
      let mut state = self.0.state.borrow_mut();
      let dependents = state.dependents.entry(dependency.to_string()).or_default();
      if !dependents.iter().any(|d| d == key) {
        dependents.push(key.to_string());
      }
    }
  }

  pub fn define_property(&self, key: &str, computed: Computed) {
    let dependent_keys = computed.dependent_keys.clone();
    {
      let mut state = self.0.state.borrow_mut();
      state.cache.remove(key);
      state.props.remove(key);
      state.computed.insert(key.to_string(), computed);
    }
    self.register_dependent_key(key, dependent_keys);
  }

  pub fn define_method<F>(&self, name: &str, method: F)
  where F: Fn(&Object, &[Value]) -> Value + 'static
  {
    self.0.state.borrow_mut().methods.insert(name.to_string(), Rc::new(method));
  }

  pub fn invoke(&self, name: &str, args: &[Value]) -> Value {
    let method = self.0.state.borrow().methods.get(name).cloned();
    match method {
      Some(method) => method(self, args),
      None => {
        log::debug!("{} has no method `{}`", self.id(), name);
        Value::NULL
      }
    }
  }

  /// Catch-all for reads of keys that are neither plain nor computed.
  pub fn set_unknown_property<F>(&self, hook: F)
  where F: Fn(&Object, &str) -> Value + 'static
  {
    self.0.state.borrow_mut().unknown_property = Some(Rc::new(hook));
  }

  pub fn freeze(&self) {
    self.0.state.borrow_mut().frozen = true;
  }

  pub fn is_frozen(&self) -> bool {
    self.0.state.borrow().frozen
  }

  pub fn is_destroyed(&self) -> bool {
    self.0.state.borrow().destroyed
  }

  /// Tears down chains and observers and unregisters the object from its run
  /// loop. Observers registered later are ignored.
  pub fn destroy(&self) {
    let (chains, observers) = {
      let mut state = self.0.state.borrow_mut();
      if state.destroyed {
        return;
      }
      state.destroyed = true;
      state.pending.clear();
      (std::mem::take(&mut state.chains), std::mem::take(&mut state.observers))
    };
    for chain in chains {
      chain.destroy();
    }
    for record in observers.values().flatten() {
      record.kill();
    }
    if let Some(run_loop) = self.run_loop() {
      run_loop.unregister(self.id());
    }
    log::debug!("destroyed {}", self.id());
  }
}

impl PartialEq for Object {
  fn eq(&self, other: &Self) -> bool {
    self.0.id == other.0.id
  }
}

impl Eq for Object {}

impl std::hash::Hash for Object {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.0.id.hash(state);
  }
}

impl std::fmt::Debug for Object {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("Object").field(&self.0.id).finish()
  }
}
