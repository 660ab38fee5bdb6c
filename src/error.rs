use crate::observable::ObjectId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
  #[error("RunLoop::end() called without a matching begin()")]
  UnbalancedRunLoop,
  #[error("end_property_changes() called without a matching begin_property_changes() on {0}")]
  UnbalancedPropertyChanges(ObjectId),
  #[error("cannot set `{key}` on a frozen object")]
  Frozen { key: String },
  #[error("property path `{0}` could not be resolved")]
  PathNotFound(String),
  #[error("run loop exceeded the maximum of {0} flush passes")]
  RunawayRunLoop(usize),
  #[error("index {index} out of range for list of length {length}")]
  IndexOutOfRange { index: usize, length: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
