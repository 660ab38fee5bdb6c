//! Observers of an index range of a [`List`].
//!
//! A range observer only hears about mutations whose changed indexes
//! intersect its range. Changes in one cycle are unioned and delivered once,
//! through the run loop's `invoke_once` queue.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::array::{List, ListCell};
use crate::index_set::IndexSet;
use crate::observable::Object;
use crate::observer::{Change, Observer, TargetId};
use crate::value::Value;

/// What a range observer is told.
#[derive(Debug, Clone)]
pub struct RangeChange {
  pub list: List,
  /// Changed indexes inside the observed range.
  pub indexes: IndexSet,
  /// For member observation: the member object and the key that changed.
  pub member: Option<(Object, String)>,
}

type RangeCallback = Rc<dyn Fn(&RangeChange)>;

pub(crate) struct RangeInner {
  id: TargetId,
  list: Weak<ListCell>,
  indexes: RefCell<IndexSet>,
  callback: RangeCallback,
  pending: RefCell<IndexSet>,
  observes_members: Cell<bool>,
  members: RefCell<Vec<Object>>,
  destroyed: Cell<bool>,
}

impl RangeInner {
  fn list(&self) -> Option<List> {
    self.list.upgrade().map(List)
  }

  fn range_did_change(self: &Rc<Self>, changed: &IndexSet) {
    if self.destroyed.get() {
      return;
    }
    let hit = self.indexes.borrow().intersection(changed);
    if hit.is_empty() {
      return;
    }
    self.pending.borrow_mut().add_set(&hit);
    let Some(list) = self.list() else { return };
    let Some(run_loop) = list.entity().run_loop() else { return };
    let this = Rc::downgrade(self);
    run_loop.invoke_once(self.id, "range_did_change", move || {
      if let Some(this) = this.upgrade() {
        this.deliver();
      }
    });
  }

  fn deliver(self: &Rc<Self>) {
    let indexes = std::mem::take(&mut *self.pending.borrow_mut());
    if indexes.is_empty() || self.destroyed.get() {
      return;
    }
    let Some(list) = self.list() else { return };
    if self.observes_members.get() {
      self.observe_members(&list);
    }
    log::trace!("range observer {:?} sees {}", self.id, indexes);
    (self.callback)(&RangeChange { list, indexes, member: None });
  }

  fn member_observer(self: &Rc<Self>) -> Observer {
    let this = Rc::downgrade(self);
    Observer::new(self.id, "member_did_change", move |change: &Change| {
      let Some(this) = this.upgrade() else { return };
      this.member_did_change(change);
    })
  }

  fn member_did_change(&self, change: &Change) {
    if self.destroyed.get() {
      return;
    }
    let Some(list) = self.list() else { return };
    let member = Value::Object(change.sender.clone());
    let indexes: IndexSet = self
      .live_indexes(&list)
      .iter()
      .filter(|index| list.object_at(*index).as_ref() == Some(&member))
      .collect();
    if indexes.is_empty() {
      return;
    }
    (self.callback)(&RangeChange {
      list,
      indexes,
      member: Some((change.sender.clone(), change.key.clone())),
    });
  }

  // observed indexes that exist in the list right now
  fn live_indexes(&self, list: &List) -> IndexSet {
    self.indexes.borrow().intersection(&IndexSet::with_range(0, list.len()))
  }

  /// Re-syncs the set of member objects observed to those currently in
  /// range.
  fn observe_members(self: &Rc<Self>, list: &List) {
    let mut wanted: Vec<Object> = vec![];
    for index in self.live_indexes(list).iter() {
      if let Some(Value::Object(object)) = list.object_at(index) {
        if !wanted.contains(&object) {
          wanted.push(object);
        }
      }
    }
    let observer = self.member_observer();
    let current = std::mem::take(&mut *self.members.borrow_mut());
    for object in current.iter().filter(|o| !wanted.contains(o)) {
      object.remove_observer("*", &observer);
    }
    for object in wanted.iter().filter(|o| !current.contains(o)) {
      object.add_observer("*", observer.clone());
    }
    *self.members.borrow_mut() = wanted;
  }

  fn stop_observing_members(self: &Rc<Self>) {
    let observer = self.member_observer();
    for object in std::mem::take(&mut *self.members.borrow_mut()) {
      object.remove_observer("*", &observer);
    }
  }
}

/// Handle to a registered range observer. The list only holds it weakly, so
/// dropping every handle stops notifications.
#[derive(Clone)]
pub struct RangeObserver(Rc<RangeInner>);

impl RangeObserver {
  pub fn indexes(&self) -> IndexSet {
    self.0.indexes.borrow().clone()
  }

  /// Moves the observed range.
  pub fn update(&self, indexes: IndexSet) {
    *self.0.indexes.borrow_mut() = indexes;
    if self.0.observes_members.get() {
      if let Some(list) = self.0.list() {
        self.0.observe_members(&list);
      }
    }
  }

  /// Also report `*` changes on the member objects inside the range.
  pub fn observing_members(self) -> Self {
    self.0.observes_members.set(true);
    if let Some(list) = self.0.list() {
      self.0.observe_members(&list);
    }
    self
  }

  pub fn is_destroyed(&self) -> bool {
    self.0.destroyed.get()
  }

  pub fn destroy(&self) {
    if self.0.destroyed.replace(true) {
      return;
    }
    self.0.stop_observing_members();
    self.0.pending.borrow_mut().clear();
    if let Some(list) = self.0.list() {
      let me = Rc::downgrade(&self.0);
      list.0.range_observers.borrow_mut().retain(|o| !o.ptr_eq(&me));
    }
  }
}

impl std::fmt::Debug for RangeObserver {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RangeObserver")
      .field("id", &self.0.id)
      .field("indexes", &*self.0.indexes.borrow())
      .finish()
  }
}

impl List {
  /// Calls `callback` once per cycle with the changed indexes that fall
  /// inside `indexes`.
  pub fn add_range_observer<F>(&self, indexes: IndexSet, callback: F) -> RangeObserver
  where F: Fn(&RangeChange) + 'static
  {
    let inner = Rc::new(RangeInner {
      id: TargetId::unique(),
      list: Rc::downgrade(&self.0),
      indexes: RefCell::new(indexes),
      callback: Rc::new(callback),
      pending: RefCell::new(IndexSet::new()),
      observes_members: Cell::new(false),
      members: RefCell::new(vec![]),
      destroyed: Cell::new(false),
    });
    let mut observers = self.0.range_observers.borrow_mut();
    observers.retain(|o| o.strong_count() > 0);
    observers.push(Rc::downgrade(&inner));
    RangeObserver(inner)
  }

  pub fn range_observer_count(&self) -> usize {
    self.0.range_observers.borrow().iter().filter(|o| o.strong_count() > 0).count()
  }

  pub(crate) fn notify_range_observers(&self, changed: &IndexSet) {
    if changed.is_empty() {
      return;
    }
    let observers: Vec<Rc<RangeInner>> = self.0.range_observers.borrow().iter().filter_map(Weak::upgrade).collect();
    for observer in observers {
      observer.range_did_change(changed);
    }
  }
}
