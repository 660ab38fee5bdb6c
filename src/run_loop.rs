use std::borrow::Cow;
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use weak_table::WeakValueHashMap;

use crate::array::List;
use crate::binding::BindingInner;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::observable::{Object, ObjectCell, ObjectId};
use crate::observer::{ObserverRecord, TargetId};
use crate::observer_queue::ObserverQueue;
use crate::observer_set::ObserverSet;
use crate::tasks::{Clock, SystemClock, Task, TaskHandle, Timer};
use crate::value::Value;

/// Runs `f`, reporting whether it returned normally.
pub(crate) fn guarded(catch_panics: bool, f: impl FnOnce()) -> bool {
  if catch_panics {
    catch_unwind(AssertUnwindSafe(f)).is_ok()
  } else {
    f();
    true
  }
}

/// What one outermost `end()` did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
  pub passes: usize,
  pub observers_fired: usize,
  pub observer_failures: usize,
  pub queued_attached: usize,
  pub bindings_synced: usize,
  pub tasks_run: usize,
  pub timers_fired: usize,
}

#[derive(Default)]
struct LoopState {
  depth: usize,
  flushing: bool,
  dirty: Vec<Weak<ObjectCell>>,
  pending_bindings: Vec<Rc<BindingInner>>,
  synced_bindings: Vec<Weak<BindingInner>>,
  once: Vec<Task>,
  last: Vec<Task>,
  timers: Vec<Timer>,
}

pub(crate) struct Inner {
  config: Config,
  clock: RefCell<Rc<dyn Clock>>,
  state: RefCell<LoopState>,
  registry: RefCell<WeakValueHashMap<ObjectId, Weak<ObjectCell>>>,
  pub(crate) observers: RefCell<ObserverSet>,
  pub(crate) queue: RefCell<ObserverQueue>,
  bindings: RefCell<Vec<Rc<BindingInner>>>,
  globals: Object,
}

/// The scheduling context: nested `begin`/`end` brackets, the pending
/// observer deliveries, queued observers, connected bindings, tasks and
/// timers. Clones share the same loop.
///
/// Changes made while no bracket is open run in an implicit bracket that
/// flushes before the mutating call returns.
#[derive(Clone)]
pub struct RunLoop(pub(crate) Rc<Inner>);

impl Default for RunLoop {
  fn default() -> Self {
    Self::new()
  }
}

impl RunLoop {
  pub fn new() -> Self {
    Self::with_config(Config::default())
  }

  pub fn with_config(config: Config) -> Self {
    Self::with_clock(config, Rc::new(SystemClock))
  }

  pub fn with_clock(config: Config, clock: Rc<dyn Clock>) -> Self {
    let inner = Rc::new_cyclic(|weak: &Weak<Inner>| {
      let globals = Object::new_in(weak.clone(), serde_json::Value::Null);
      let mut registry = WeakValueHashMap::new();
      registry.insert(globals.id(), globals.0.clone());
      Inner {
        config,
        clock: RefCell::new(clock),
        state: RefCell::new(LoopState::default()),
        registry: RefCell::new(registry),
        observers: RefCell::new(ObserverSet::new()),
        queue: RefCell::new(ObserverQueue::default()),
        bindings: RefCell::new(vec![]),
        globals,
      }
    });
    log::debug!("run loop created, max {} flush passes", inner.config.max_flush_passes);
    RunLoop(inner)
  }

  pub(crate) fn from_inner(inner: Rc<Inner>) -> Self {
    RunLoop(inner)
  }

  pub fn config(&self) -> &Config {
    &self.0.config
  }

  pub fn set_clock(&self, clock: Rc<dyn Clock>) {
    *self.0.clock.borrow_mut() = clock;
  }

  pub fn now(&self) -> Instant {
    let clock = self.0.clock.borrow().clone();
    clock.now()
  }

  /// Root for paths given without an explicit object.
  pub fn globals(&self) -> Object {
    self.0.globals.clone()
  }

  pub fn create_object(&self, props: serde_json::Value) -> Object {
    let object = Object::new_in(Rc::downgrade(&self.0), props);
    self.0.registry.borrow_mut().insert(object.id(), object.0.clone());
    object
  }

  pub fn create_list<I, V>(&self, items: I) -> List
  where I: IntoIterator<Item = V>, V: Into<Value>
  {
    List::new(self, items.into_iter().map(Into::into).collect())
  }

  /// Looks up a live object by id.
  pub fn object(&self, id: ObjectId) -> Option<Object> {
    let cell = self.0.registry.borrow().get(&id);
    cell.map(Object)
  }

  pub(crate) fn unregister(&self, id: ObjectId) {
    self.0.registry.borrow_mut().remove(&id);
  }

  pub fn depth(&self) -> usize {
    self.0.state.borrow().depth
  }

  pub fn is_flushing(&self) -> bool {
    self.0.state.borrow().flushing
  }

  pub fn begin(&self) {
    self.0.state.borrow_mut().depth += 1;
  }

  /// Closes a bracket. Closing the outermost one flushes.
  pub fn end(&self) -> Result<FlushReport> {
    let flush = {
      let mut state = self.0.state.borrow_mut();
      if state.depth == 0 {
        return Err(Error::UnbalancedRunLoop);
      }
      state.depth -= 1;
      state.depth == 0 && !state.flushing
    };
    if flush {
      self.flush()
    } else {
      Ok(FlushReport::default())
    }
  }

  pub fn run<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
    self.begin();
    let ret = f();
    self.end()?;
    Ok(ret)
  }

  /// An empty bracket: delivers anything pending and fires due timers.
  pub fn tick(&self) -> Result<FlushReport> {
    self.begin();
    self.end()
  }

  pub(crate) fn autorun(&self) -> Result<()> {
    let idle = {
      let state = self.0.state.borrow();
      state.depth == 0 && !state.flushing
    };
    if idle {
      self.begin();
      self.end()?;
    }
    Ok(())
  }

  pub(crate) fn mark_dirty(&self, object: &Object) {
    if object.mark_queued() {
      self.0.state.borrow_mut().dirty.push(Rc::downgrade(&object.0));
    }
  }

  pub(crate) fn enqueue_notification(&self, object: &Object, key: &str, previous: Option<Value>, record: ObserverRecord) {
    self.0.observers.borrow_mut().add(object, key, previous, record);
  }

  /// Observer deliveries waiting for the next flush.
  pub fn pending_observers(&self) -> usize {
    self.0.observers.borrow().len()
  }

  pub(crate) fn register_binding(&self, binding: Rc<BindingInner>) {
    self.0.bindings.borrow_mut().push(binding);
  }

  pub(crate) fn unregister_binding(&self, id: TargetId) {
    self.0.bindings.borrow_mut().retain(|binding| binding.id() != id);
    self.0.state.borrow_mut().pending_bindings.retain(|binding| binding.id() != id);
  }

  pub fn connected_bindings(&self) -> usize {
    self.0.bindings.borrow().len()
  }

  pub(crate) fn schedule_binding(&self, binding: Rc<BindingInner>) {
    if binding.mark_scheduled() {
      self.0.state.borrow_mut().pending_bindings.push(binding);
    }
  }

  /// Runs `f` once in the current cycle; scheduling the same
  /// `(target, method)` again before it ran returns the existing handle.
  pub fn invoke_once<F>(&self, target: TargetId, method: impl Into<Cow<'static, str>>, f: F) -> TaskHandle
  where F: FnOnce() + 'static
  {
    let method = method.into();
    let mut state = self.0.state.borrow_mut();
    let existing = state.once.iter().find(|task| {
      !task.handle.is_cancelled() && task.key.as_ref().map_or(false, |(t, m)| *t == target && *m == method)
    });
    if let Some(task) = existing {
      return task.handle.clone();
    }
    let handle = TaskHandle::default();
    state.once.push(Task {
      key: Some((target, method)),
      handle: handle.clone(),
      callback: Box::new(f),
    });
    handle
  }

  /// Runs `f` after the `invoke_once` work of the current cycle.
  pub fn invoke_last<F>(&self, f: F) -> TaskHandle
  where F: FnOnce() + 'static
  {
    let handle = TaskHandle::default();
    self.0.state.borrow_mut().last.push(Task {
      key: None,
      handle: handle.clone(),
      callback: Box::new(f),
    });
    handle
  }

  /// Runs `f` in the first flush at least `delay` from now.
  pub fn invoke_later<F>(&self, delay: Duration, f: F) -> TaskHandle
  where F: FnOnce() + 'static
  {
    let slot = RefCell::new(Some(f));
    self.schedule_timer(delay, false, move || {
      let f = slot.borrow_mut().take();
      if let Some(f) = f {
        f();
      }
    })
  }

  pub fn schedule_timer<F>(&self, interval: Duration, repeats: bool, f: F) -> TaskHandle
  where F: Fn() + 'static
  {
    let handle = TaskHandle::default();
    let due = self.now() + interval;
    self.0.state.borrow_mut().timers.push(Timer {
      due,
      interval: repeats.then_some(interval),
      handle: handle.clone(),
      callback: Rc::new(f),
    });
    handle
  }

  pub fn next_timer_deadline(&self) -> Option<Instant> {
    let state = self.0.state.borrow();
    state
      .timers
      .iter()
      .filter(|timer| !timer.handle.is_cancelled())
      .map(|timer| timer.due)
      .min()
  }

  /// Drops all pending work and disconnects every binding.
  pub fn reset(&self) {
    let bindings = std::mem::take(&mut *self.0.bindings.borrow_mut());
    for binding in bindings {
      binding.disconnect_from(self);
    }
    let state = std::mem::take(&mut *self.0.state.borrow_mut());
    for object in state.dirty.iter().filter_map(Weak::upgrade) {
      Object(object).discard_pending();
    }
    self.0.observers.borrow_mut().clear();
    self.0.queue.borrow_mut().clear();
    log::debug!("run loop reset");
  }

  fn has_pending_work(&self, now: Instant) -> bool {
    if !self.0.observers.borrow().is_empty() {
      return true;
    }
    let state = self.0.state.borrow();
    !state.dirty.is_empty()
      || !state.pending_bindings.is_empty()
      || !state.once.is_empty()
      || !state.last.is_empty()
      || state.timers.iter().any(|timer| timer.is_due(now))
  }

  fn flush(&self) -> Result<FlushReport> {
    self.0.state.borrow_mut().flushing = true;
    let result = self.flush_passes();
    let synced = {
      let mut state = self.0.state.borrow_mut();
      state.flushing = false;
      std::mem::take(&mut state.synced_bindings)
    };
    for binding in synced.iter().filter_map(Weak::upgrade) {
      binding.clear_suppression();
    }
    if let Ok(report) = &result {
      if report.passes > 0 {
        log::trace!("flush done: {:?}", report);
      }
    }
    result
  }

  fn flush_passes(&self) -> Result<FlushReport> {
    let mut report = FlushReport::default();
    let max_passes = self.0.config.max_flush_passes;
    while self.has_pending_work(self.now()) {
      if report.passes >= max_passes {
        self.discard_pending();
        log::error!("run loop exceeded {} flush passes, pending work discarded", max_passes);
        return Err(Error::RunawayRunLoop(max_passes));
      }
      report.passes += 1;
      self.flush_property_changes();
      report.queued_attached += self.flush_observer_queue(None);
      let stats = {
        let snapshot = self.0.observers.borrow_mut().take();
        snapshot.fire(self.0.config.catch_observer_panics)
      };
      report.observers_fired += stats.fired;
      report.observer_failures += stats.failed;
      report.bindings_synced += self.flush_bindings();
      report.tasks_run += self.flush_tasks();
      report.timers_fired += self.fire_timers();
    }
    Ok(report)
  }

  fn flush_property_changes(&self) {
    let dirty = std::mem::take(&mut self.0.state.borrow_mut().dirty);
    for object in dirty.iter().filter_map(Weak::upgrade).map(Object) {
      for (key, previous) in object.take_pending() {
        let records = object.observers_for(&key);
        let mut observers = self.0.observers.borrow_mut();
        for record in records {
          observers.add(&object, &key, previous.clone(), record);
        }
      }
    }
  }

  fn flush_bindings(&self) -> usize {
    let pending = std::mem::take(&mut self.0.state.borrow_mut().pending_bindings);
    let mut synced = 0;
    for binding in pending {
      binding.clear_scheduled();
      match binding.sync() {
        Ok(true) => {
          synced += 1;
          self.0.state.borrow_mut().synced_bindings.push(Rc::downgrade(&binding));
        }
        Ok(false) => {}
        Err(err) => log::warn!("binding {:?} failed to sync: {}", binding.id(), err),
      }
    }
    synced
  }

  fn flush_tasks(&self) -> usize {
    let catch_panics = self.0.config.catch_observer_panics;
    let mut ran = 0;
    for queue in [TaskQueue::Once, TaskQueue::Last] {
      let tasks = {
        let mut state = self.0.state.borrow_mut();
        match queue {
          TaskQueue::Once => std::mem::take(&mut state.once),
          TaskQueue::Last => std::mem::take(&mut state.last),
        }
      };
      for task in tasks {
        if task.handle.is_cancelled() {
          continue;
        }
        ran += 1;
        if !guarded(catch_panics, task.callback) {
          log::error!("task {:?} panicked", task.key);
        }
      }
    }
    ran
  }

  fn fire_timers(&self) -> usize {
    let now = self.now();
    let timers = std::mem::take(&mut self.0.state.borrow_mut().timers);
    let (due, mut waiting): (Vec<Timer>, Vec<Timer>) = timers
      .into_iter()
      .filter(|timer| !timer.handle.is_cancelled())
      .partition(|timer| timer.is_due(now));
    let mut fired = 0;
    for mut timer in due {
      fired += 1;
      let callback = timer.callback.clone();
      if !guarded(self.0.config.catch_observer_panics, || callback()) {
        log::error!("timer panicked");
      }
      if let Some(interval) = timer.interval {
        if !timer.handle.is_cancelled() {
          timer.due = now + interval.max(Duration::from_millis(1));
          waiting.push(timer);
        }
      }
    }
    let mut state = self.0.state.borrow_mut();
    waiting.append(&mut state.timers);
    state.timers = waiting;
    fired
  }

  fn discard_pending(&self) {
    let (dirty, bindings) = {
      let mut state = self.0.state.borrow_mut();
      state.once.clear();
      state.last.clear();
      (std::mem::take(&mut state.dirty), std::mem::take(&mut state.pending_bindings))
    };
    for object in dirty.iter().filter_map(Weak::upgrade) {
      Object(object).discard_pending();
    }
    for binding in bindings {
      binding.clear_scheduled();
    }
    self.0.observers.borrow_mut().clear();
  }
}

#[derive(Clone, Copy)]
enum TaskQueue {
  Once,
  Last,
}
