use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::observable::{Object, ObjectId};
use crate::observer::{Observer, ObserverRecord, TargetId};
use crate::run_loop::{self, RunLoop};

struct Link {
  object: ObjectId,
  key: String,
  observer: Observer,
}

/// Observes a dotted path from a root object.
///
/// Link `i` observes `segments[i]` on the object reached by the first `i`
/// segments. When a link fires, every link after it is detached and rebuilt
/// against the new intermediate object, then the path's observer is queued.
/// Links refer to objects by id only; a dropped intermediate simply ends the
/// chain.
pub(crate) struct ChainObserver {
  id: TargetId,
  run_loop: Weak<run_loop::Inner>,
  root: ObjectId,
  path: String,
  segments: Vec<String>,
  record: ObserverRecord,
  links: RefCell<Vec<Link>>,
}

impl ChainObserver {
  pub(crate) fn new(root: &Object, path: &str, observer: Observer) -> Rc<Self> {
    let chain = Rc::new(Self {
      id: TargetId::unique(),
      run_loop: root.run_loop().map(|rl| Rc::downgrade(&rl.0)).unwrap_or_default(),
      root: root.id(),
      path: path.to_string(),
      segments: path.split('.').filter(|s| !s.is_empty()).map(String::from).collect(),
      record: ObserverRecord::new(observer),
      links: RefCell::new(vec![]),
    });
    log::trace!("chain `{}` on {}", path, root.id());
    chain.attach_from(0, root.clone());
    chain
  }

  pub(crate) fn matches(&self, path: &str, observer: &Observer) -> bool {
    self.path == path && self.record.observer.same_as(observer)
  }

  fn run_loop(&self) -> Option<RunLoop> {
    self.run_loop.upgrade().map(RunLoop::from_inner)
  }

  fn attach_from(self: &Rc<Self>, start: usize, object: Object) {
    let mut current = Some(object);
    for index in start..self.segments.len() {
      let Some(object) = current.take() else { break };
      let key = &self.segments[index];
      let weak = Rc::downgrade(self);
      let observer = Observer::new(self.id, format!("link:{}", index), move |_| {
        if let Some(chain) = weak.upgrade() {
          chain.link_did_change(index);
        }
      });
      object.add_key_observer(key, observer.clone());
      self.links.borrow_mut().push(Link {
        object: object.id(),
        key: key.clone(),
        observer,
      });
      if index + 1 < self.segments.len() {
        current = object.get(key).as_observable();
      }
    }
  }

  fn detach_from(&self, start: usize) {
    let stale = {
      let mut links = self.links.borrow_mut();
      if start >= links.len() {
        return;
      }
      links.split_off(start)
    };
    let Some(run_loop) = self.run_loop() else { return };
    for link in stale {
      if let Some(object) = run_loop.object(link.object) {
        object.remove_key_observer(&link.key, &link.observer);
      }
    }
  }

  fn link_did_change(self: &Rc<Self>, index: usize) {
    if !self.record.is_live() {
      return;
    }
    let Some(run_loop) = self.run_loop() else { return };
    if index + 1 < self.segments.len() {
      self.detach_from(index + 1);
      let owner = self.links.borrow().get(index).map(|link| link.object);
      let next = owner
        .and_then(|id| run_loop.object(id))
        .and_then(|object| object.get(&self.segments[index]).as_observable());
      if let Some(next) = next {
        self.attach_from(index + 1, next);
      }
    }
    if let Some(root) = run_loop.object(self.root) {
      run_loop.enqueue_notification(&root, &self.path, None, self.record.clone());
    }
  }

  pub(crate) fn destroy(&self) {
    self.record.kill();
    self.detach_from(0);
  }
}
