use std::borrow::Cow;
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::observer::TargetId;

pub trait Clock {
  fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> Instant {
    Instant::now()
  }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
  base: Instant,
  offset: Cell<Duration>,
}

impl ManualClock {
  pub fn new() -> Self {
    Self { base: Instant::now(), offset: Cell::new(Duration::ZERO) }
  }

  pub fn advance(&self, by: Duration) {
    self.offset.set(self.offset.get() + by);
  }
}

impl Default for ManualClock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock for ManualClock {
  fn now(&self) -> Instant {
    self.base + self.offset.get()
  }
}

/// Cancellation token for scheduled work.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
  cancelled: Rc<Cell<bool>>,
}

impl TaskHandle {
  pub fn cancel(&self) {
    self.cancelled.set(true);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.get()
  }
}

pub(crate) struct Task {
  pub(crate) key: Option<(TargetId, Cow<'static, str>)>,
  pub(crate) handle: TaskHandle,
  pub(crate) callback: Box<dyn FnOnce()>,
}

pub(crate) struct Timer {
  pub(crate) due: Instant,
  pub(crate) interval: Option<Duration>,
  pub(crate) handle: TaskHandle,
  pub(crate) callback: Rc<dyn Fn()>,
}

impl Timer {
  pub(crate) fn is_due(&self, now: Instant) -> bool {
    !self.handle.is_cancelled() && self.due <= now
  }
}
