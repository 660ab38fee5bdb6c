use std::borrow::Cow;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::observable::Object;
use crate::value::Value;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id() -> u64 {
  NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identity of whatever receives a notification. Paired with a method name it
/// forms the identity of an [`Observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub(crate) u64);

impl TargetId {
  pub fn unique() -> Self {
    TargetId(next_id())
  }
}

impl From<&Object> for TargetId {
  fn from(obj: &Object) -> Self {
    TargetId(obj.id().0)
  }
}

/// What an observer is told when a property it watches changed.
#[derive(Debug, Clone)]
pub struct Change {
  pub sender: Object,
  /// The observed key or path, or the concrete key for `*` observers.
  pub key: String,
  /// Value at delivery time, so batched changes report the final state.
  pub value: Value,
  /// Value recorded by the first `property_will_change` of the batch.
  pub previous: Option<Value>,
  pub context: Option<Value>,
  pub revision: u64,
}

pub(crate) type Callback = Rc<dyn Fn(&Change)>;
pub(crate) type AttachHook = Rc<dyn Fn()>;

/// A `{target, method}` pair plus the code to run.
///
/// Two observers with the same target and method are the same observer:
/// registering it twice on a key still fires it once per change.
#[derive(Clone)]
pub struct Observer {
  pub(crate) target: TargetId,
  pub(crate) method: Cow<'static, str>,
  pub(crate) context: Option<Value>,
  pub(crate) one_shot: bool,
  pub(crate) callback: Callback,
  pub(crate) on_attach: Option<AttachHook>,
}

impl Observer {
  pub fn new<F>(target: impl Into<TargetId>, method: impl Into<Cow<'static, str>>, callback: F) -> Self
  where F: Fn(&Change) + 'static
  {
    Self {
      target: target.into(),
      method: method.into(),
      context: None,
      one_shot: false,
      callback: Rc::new(callback),
      on_attach: None,
    }
  }

  /// An observer with a fresh target, equal only to its own clones.
  pub fn from_fn<F>(callback: F) -> Self
  where F: Fn(&Change) + 'static
  {
    Self::new(TargetId::unique(), "call", callback)
  }

  pub fn with_context(mut self, context: impl Into<Value>) -> Self {
    self.context = Some(context.into());
    self
  }

  /// Remove the observer after it fires for the first time.
  pub fn once(mut self) -> Self {
    self.one_shot = true;
    self
  }

  /// Runs `hook` when the observer, queued behind a path that did not
  /// resolve yet, is finally attached. No change is delivered for the attach
  /// itself.
  pub fn on_attach<F>(mut self, hook: F) -> Self
  where F: Fn() + 'static
  {
    self.on_attach = Some(Rc::new(hook));
    self
  }

  pub fn target(&self) -> TargetId {
    self.target
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn same_as(&self, other: &Observer) -> bool {
    self.target == other.target && self.method == other.method
  }
}

impl std::fmt::Debug for Observer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Observer")
      .field("target", &self.target)
      .field("method", &self.method)
      .field("one_shot", &self.one_shot)
      .finish()
  }
}

/// One registration of an observer on a key. The `live` flag is shared with
/// every queued copy so removal stops pending deliveries too.
#[derive(Clone, Debug)]
pub(crate) struct ObserverRecord {
  pub(crate) observer: Observer,
  live: Rc<Cell<bool>>,
}

impl ObserverRecord {
  pub(crate) fn new(observer: Observer) -> Self {
    Self { observer, live: Rc::new(Cell::new(true)) }
  }

  pub(crate) fn is_live(&self) -> bool {
    self.live.get()
  }

  pub(crate) fn kill(&self) {
    self.live.set(false);
  }

  pub(crate) fn same_as(&self, other: &ObserverRecord) -> bool {
    self.observer.same_as(&other.observer)
  }
}
