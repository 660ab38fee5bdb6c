pub const MAX_FLUSH_PASSES_ENV: &str = "KVO_MAX_FLUSH_PASSES";

/// Tunables for a [`RunLoop`](crate::RunLoop).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Upper bound on passes of a single flush before it is reported as runaway.
  pub max_flush_passes: usize,
  /// Isolate panicking observers instead of unwinding through the flush.
  pub catch_observer_panics: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      max_flush_passes: 100,
      catch_observer_panics: true,
    }
  }
}

impl Config {
  pub fn from_env() -> Self {
    let mut config = Self::default();
    if let Ok(raw) = std::env::var(MAX_FLUSH_PASSES_ENV) {
      match raw.trim().parse::<usize>() {
        Ok(passes) if passes > 0 => config.max_flush_passes = passes,
        _ => log::warn!("ignoring invalid {}={:?}", MAX_FLUSH_PASSES_ENV, raw),
      }
    }
    config
  }

  pub fn max_flush_passes(mut self, passes: usize) -> Self {
    self.max_flush_passes = passes.max(1);
    self
  }

  pub fn catch_observer_panics(mut self, catch: bool) -> Self {
    self.catch_observer_panics = catch;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_passes_is_clamped() {
    assert_eq!(Config::default().max_flush_passes(0).max_flush_passes, 1);
  }
}
