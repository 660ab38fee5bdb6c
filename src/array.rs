//! Observable ordered collections.
//!
//! Every mutation goes through [`List::replace`], which brackets the splice
//! with exactly one `will_change`/`did_change(start, removed, added)` pair,
//! notifies array observers and range observers, and then reports the key
//! changes (`[]`, `length`, `firstObject`, `lastObject`) on the list's
//! observable entity. Each `replace` runs inside its own run loop bracket.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};
use crate::index_set::IndexSet;
use crate::observable::{Computed, Object};
use crate::observer::TargetId;
use crate::path;
use crate::range_observer::RangeInner;
use crate::run_loop::{guarded, RunLoop};
use crate::value::Value;

/// The range a mutation touched: `removed` items at `start` were replaced by
/// `added` new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayChange {
  pub start: usize,
  pub removed: usize,
  pub added: usize,
}

type ArrayCallback = Rc<dyn Fn(&List, ArrayChange)>;

/// Range-aware observer of a [`List`]. Identity is its target.
///
/// Both callbacks of a `replace` receive the same [`ArrayChange`]. A bracket
/// opened with [`List::array_content_will_change_all`] cannot know the new
/// length up front: `will_change` sees `(0, old_len, 0)` and `did_change`
/// sees `(0, old_len, new_len)`.
#[derive(Clone)]
pub struct ArrayObserver {
  target: TargetId,
  will_change: Option<ArrayCallback>,
  did_change: Option<ArrayCallback>,
}

impl ArrayObserver {
  pub fn new(target: impl Into<TargetId>) -> Self {
    Self {
      target: target.into(),
      will_change: None,
      did_change: None,
    }
  }

  pub fn will_change<F>(mut self, f: F) -> Self
  where F: Fn(&List, ArrayChange) + 'static
  {
    self.will_change = Some(Rc::new(f));
    self
  }

  pub fn did_change<F>(mut self, f: F) -> Self
  where F: Fn(&List, ArrayChange) + 'static
  {
    self.did_change = Some(Rc::new(f));
    self
  }

  pub fn target(&self) -> TargetId {
    self.target
  }
}

impl std::fmt::Debug for ArrayObserver {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ArrayObserver").field("target", &self.target).finish()
  }
}

pub(crate) struct ListCell {
  entity: Object,
  items: RefCell<Vec<Value>>,
  array_observers: RefCell<Vec<ArrayObserver>>,
  pub(crate) range_observers: RefCell<Vec<Weak<RangeInner>>>,
  // length at the first will_change of the open bracket
  length_before: Cell<Option<usize>>,
}

#[derive(Clone)]
pub struct List(pub(crate) Rc<ListCell>);

impl List {
  pub(crate) fn new(run_loop: &RunLoop, items: Vec<Value>) -> Self {
    let entity = run_loop.create_object(serde_json::Value::Null);
    let cell = Rc::new_cyclic(|weak: &Weak<ListCell>| {
      let list = weak.clone();
      entity.define_property(
        "length",
        Computed::getter(move |_| list.upgrade().map_or(Value::from(0usize), |l| Value::from(l.items.borrow().len()))),
      );
      let list = weak.clone();
      entity.define_property("[]", Computed::getter(move |_| list.upgrade().map(List).into()));
      let list = weak.clone();
      entity.define_property(
        "firstObject",
        Computed::getter(move |_| list.upgrade().and_then(|l| l.items.borrow().first().cloned()).into()),
      );
      let list = weak.clone();
      entity.define_property(
        "lastObject",
        Computed::getter(move |_| list.upgrade().and_then(|l| l.items.borrow().last().cloned()).into()),
      );
      let list = weak.clone();
      entity.set_unknown_property(move |_, key| {
        if !path::is_index(key) {
          return Value::NULL;
        }
        let index = key.parse::<usize>().ok();
        list
          .upgrade()
          .and_then(|l| index.and_then(|i| l.items.borrow().get(i).cloned()))
          .unwrap_or_default()
      });
      ListCell {
        entity: entity.clone(),
        items: RefCell::new(items),
        array_observers: RefCell::new(vec![]),
        range_observers: RefCell::new(vec![]),
        length_before: Cell::new(None),
      }
    });
    List(cell)
  }

  /// The observation component: key observers for `length`, `[]`,
  /// `firstObject` and `lastObject` attach here.
  pub fn entity(&self) -> &Object {
    &self.0.entity
  }

  pub fn len(&self) -> usize {
    self.0.items.borrow().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn object_at(&self, index: usize) -> Option<Value> {
    self.0.items.borrow().get(index).cloned()
  }

  pub fn to_vec(&self) -> Vec<Value> {
    self.0.items.borrow().clone()
  }

  /// Decimal keys read items; anything else reads the entity.
  pub fn get(&self, key: &str) -> Value {
    if path::is_index(key) {
      return key.parse::<usize>().ok().and_then(|i| self.object_at(i)).unwrap_or_default();
    }
    self.0.entity.get(key)
  }

  pub fn add_array_observer(&self, observer: ArrayObserver) {
    let mut observers = self.0.array_observers.borrow_mut();
    if observers.iter().any(|o| o.target == observer.target) {
      return;
    }
    observers.push(observer);
  }

  pub fn remove_array_observer(&self, observer: &ArrayObserver) {
    self.0.array_observers.borrow_mut().retain(|o| o.target != observer.target);
  }

  pub fn array_observer_count(&self) -> usize {
    self.0.array_observers.borrow().len()
  }

  fn notify_array_observers(&self, change: ArrayChange, did: bool) {
    let observers = self.0.array_observers.borrow().clone();
    let catch_panics = self.0.entity.run_loop().map_or(true, |rl| rl.config().catch_observer_panics);
    for observer in observers {
      let callback = if did { &observer.did_change } else { &observer.will_change };
      let Some(callback) = callback.clone() else { continue };
      if !guarded(catch_panics, || callback(self, change)) {
        log::error!("array observer {:?} panicked on {:?}", observer.target, change);
      }
    }
  }

  pub fn array_content_will_change(&self, start: usize, removed: usize, added: usize) {
    if self.0.length_before.get().is_none() {
      self.0.length_before.set(Some(self.len()));
    }
    let entity = &self.0.entity;
    entity.property_will_change("[]");
    if removed != added {
      entity.property_will_change("length");
    }
    self.notify_array_observers(ArrayChange { start, removed, added }, false);
  }

  pub fn array_content_did_change(&self, start: usize, removed: usize, added: usize) -> Result<()> {
    let length = self.len();
    let length_before = self
      .0
      .length_before
      .take()
      .unwrap_or_else(|| length.saturating_add(removed).saturating_sub(added));
    let change = ArrayChange { start, removed, added };
    log::trace!("{} did change {:?}", self.0.entity.id(), change);
    self.notify_array_observers(change, true);

    let changed = if removed == added {
      IndexSet::with_range(start, added)
    } else {
      IndexSet::with_range(start, length.max(length_before).saturating_sub(start))
    };
    self.notify_range_observers(&changed);

    let entity = &self.0.entity;
    entity.begin_property_changes();
    entity.property_did_change("[]")?;
    if length != length_before {
      entity.property_did_change("length")?;
    }
    if start == 0 {
      entity.property_did_change("firstObject")?;
    }
    if start.saturating_add(removed) >= length_before || start.saturating_add(added) >= length {
      entity.property_did_change("lastObject")?;
    }
    entity.end_property_changes()
  }

  /// Brackets a change whose extent is unknown up front. Observers are told
  /// `(0, len, 0)`; the new length is only reported by the matching
  /// [`array_content_did_change_all`](List::array_content_did_change_all).
  pub fn array_content_will_change_all(&self) {
    self.array_content_will_change(0, self.len(), 0);
  }

  /// Reports the whole list as replaced: the length recorded by the open
  /// `will_change` (or the current length when none is open) was removed and
  /// the current contents were added.
  pub fn array_content_did_change_all(&self) -> Result<()> {
    let removed = self.0.length_before.get().unwrap_or_else(|| self.len());
    self.array_content_did_change(0, removed, self.len())
  }

  /// Replaces `amount` items at `start` with `objects`. `amount` is clamped to
  /// the end of the list; a `start` past the end is an error.
  pub fn replace<I, V>(&self, start: usize, amount: usize, objects: I) -> Result<()>
  where I: IntoIterator<Item = V>, V: Into<Value>
  {
    let objects: Vec<Value> = objects.into_iter().map(Into::into).collect();
    let length = self.len();
    if start > length {
      return Err(Error::IndexOutOfRange { index: start, length });
    }
    let removed = amount.min(length - start);
    let added = objects.len();
    if removed == 0 && added == 0 {
      return Ok(());
    }
    self.bracket(|list| {
      list.array_content_will_change(start, removed, added);
      list.0.items.borrow_mut().splice(start..start + removed, objects);
      list.array_content_did_change(start, removed, added)
    })
  }

  /// Mutates the backing vector directly and reports the whole list as
  /// replaced. `f` must not touch this list.
  pub fn mutate_in_place<F>(&self, f: F) -> Result<()>
  where F: FnOnce(&mut Vec<Value>)
  {
    self.bracket(|list| {
      list.array_content_will_change_all();
      f(&mut list.0.items.borrow_mut());
      list.array_content_did_change_all()
    })
  }

  fn bracket(&self, f: impl FnOnce(&List) -> Result<()>) -> Result<()> {
    let Some(run_loop) = self.0.entity.run_loop() else {
      return f(self);
    };
    run_loop.begin();
    let result = f(self);
    let ended = run_loop.end();
    result?;
    ended.map(|_| ())
  }

  pub fn push_object(&self, object: impl Into<Value>) -> Result<()> {
    self.replace(self.len(), 0, [object.into()])
  }

  pub fn push_objects<I, V>(&self, objects: I) -> Result<()>
  where I: IntoIterator<Item = V>, V: Into<Value>
  {
    self.replace(self.len(), 0, objects)
  }

  pub fn pop_object(&self) -> Result<Option<Value>> {
    let length = self.len();
    if length == 0 {
      return Ok(None);
    }
    let last = self.object_at(length - 1);
    self.replace(length - 1, 1, Vec::<Value>::new())?;
    Ok(last)
  }

  pub fn shift_object(&self) -> Result<Option<Value>> {
    let first = self.object_at(0);
    if first.is_some() {
      self.replace(0, 1, Vec::<Value>::new())?;
    }
    Ok(first)
  }

  pub fn unshift_object(&self, object: impl Into<Value>) -> Result<()> {
    self.replace(0, 0, [object.into()])
  }

  pub fn insert_at(&self, index: usize, object: impl Into<Value>) -> Result<()> {
    self.replace(index, 0, [object.into()])
  }

  pub fn remove_at(&self, index: usize, count: usize) -> Result<()> {
    let length = self.len();
    if index >= length {
      return Err(Error::IndexOutOfRange { index, length });
    }
    self.replace(index, count, Vec::<Value>::new())
  }

  /// Removes every occurrence of `object`. Returns how many were removed.
  pub fn remove_object(&self, object: &Value) -> Result<usize> {
    let positions: Vec<usize> = self
      .0
      .items
      .borrow()
      .iter()
      .enumerate()
      .filter(|(_, item)| *item == object)
      .map(|(index, _)| index)
      .collect();
    if positions.is_empty() {
      return Ok(0);
    }
    self.bracket(|list| {
      for index in positions.iter().rev() {
        list.replace(*index, 1, Vec::<Value>::new())?;
      }
      Ok(())
    })?;
    Ok(positions.len())
  }

  pub fn replace_content<I, V>(&self, objects: I) -> Result<()>
  where I: IntoIterator<Item = V>, V: Into<Value>
  {
    self.replace(0, self.len(), objects)
  }

  pub fn clear(&self) -> Result<()> {
    self.replace(0, self.len(), Vec::<Value>::new())
  }
}

impl PartialEq for List {
  fn eq(&self, other: &Self) -> bool {
    Rc::ptr_eq(&self.0, &other.0)
  }
}

impl Eq for List {}

impl std::fmt::Debug for List {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("List")
      .field("entity", &self.0.entity.id())
      .field("len", &self.len())
      .finish()
  }
}
