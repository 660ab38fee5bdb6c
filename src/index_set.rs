//! Sets of indexes stored as sorted, disjoint, non-adjacent ranges.

use std::fmt;
use std::ops::Range;

/// End marker for a range that runs to infinity.
const UNBOUNDED: usize = usize::MAX;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct IndexSet {
  ranges: Vec<Range<usize>>,
}

fn range_of(start: usize, length: usize) -> Range<usize> {
  start..start.saturating_add(length)
}

impl IndexSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_range(start: usize, length: usize) -> Self {
    let mut set = Self::new();
    set.add(start, length);
    set
  }

  pub fn from_index(index: usize) -> Self {
    Self::with_range(index, 1)
  }

  /// Every index from `start` on.
  pub fn unbounded_from(start: usize) -> Self {
    Self { ranges: vec![start..UNBOUNDED] }
  }

  /// Adds `[start, start + length)`, merging with anything it touches.
  pub fn add(&mut self, start: usize, length: usize) -> &mut Self {
    let range = range_of(start, length);
    if range.is_empty() {
      return self;
    }
    // first range that ends at or after `start` (touching counts)
    let lo = self.ranges.partition_point(|r| r.end < range.start);
    // first range that starts strictly after the new end
    let hi = self.ranges.partition_point(|r| r.start <= range.end);
    let merged = if lo < hi {
      self.ranges[lo].start.min(range.start)..self.ranges[hi - 1].end.max(range.end)
    } else {
      range
    };
    self.ranges.splice(lo..hi, [merged]);
    self
  }

  pub fn add_index(&mut self, index: usize) -> &mut Self {
    self.add(index, 1)
  }

  pub fn add_set(&mut self, other: &IndexSet) -> &mut Self {
    for range in &other.ranges {
      self.add(range.start, range.end - range.start);
    }
    self
  }

  /// Removes `[start, start + length)`, splitting a range when needed.
  pub fn remove(&mut self, start: usize, length: usize) -> &mut Self {
    let range = range_of(start, length);
    if range.is_empty() {
      return self;
    }
    let lo = self.ranges.partition_point(|r| r.end <= range.start);
    let hi = self.ranges.partition_point(|r| r.start < range.end);
    if lo >= hi {
      return self;
    }
    let mut keep = Vec::with_capacity(2);
    let first = &self.ranges[lo];
    if first.start < range.start {
      keep.push(first.start..range.start);
    }
    let last = &self.ranges[hi - 1];
    if last.end > range.end {
      keep.push(range.end..last.end);
    }
    self.ranges.splice(lo..hi, keep);
    self
  }

  pub fn remove_index(&mut self, index: usize) -> &mut Self {
    self.remove(index, 1)
  }

  pub fn remove_set(&mut self, other: &IndexSet) -> &mut Self {
    for range in &other.ranges {
      self.remove(range.start, range.end - range.start);
    }
    self
  }

  pub fn clear(&mut self) {
    self.ranges.clear();
  }

  pub fn contains(&self, index: usize) -> bool {
    self.range_start_for_index(index).is_some()
  }

  /// Whether every index of `[start, start + length)` is in the set.
  pub fn contains_range(&self, start: usize, length: usize) -> bool {
    let range = range_of(start, length);
    if range.is_empty() {
      return true;
    }
    let at = self.ranges.partition_point(|r| r.end <= range.start);
    self.ranges.get(at).map_or(false, |r| r.start <= range.start && range.end <= r.end)
  }

  /// Whether any index of `[start, start + length)` is in the set.
  pub fn intersects_range(&self, start: usize, length: usize) -> bool {
    let range = range_of(start, length);
    if range.is_empty() {
      return false;
    }
    let at = self.ranges.partition_point(|r| r.end <= range.start);
    self.ranges.get(at).map_or(false, |r| r.start < range.end)
  }

  pub fn intersects(&self, other: &IndexSet) -> bool {
    other.ranges.iter().any(|r| self.intersects_range(r.start, r.end - r.start))
  }

  pub fn intersection(&self, other: &IndexSet) -> IndexSet {
    let mut out = IndexSet::new();
    let (mut i, mut j) = (0, 0);
    while i < self.ranges.len() && j < other.ranges.len() {
      let (a, b) = (&self.ranges[i], &other.ranges[j]);
      let start = a.start.max(b.start);
      let end = a.end.min(b.end);
      if start < end {
        out.ranges.push(start..end);
      }
      if a.end <= b.end {
        i += 1;
      } else {
        j += 1;
      }
    }
    out
  }

  /// Start of the range holding `index`.
  pub fn range_start_for_index(&self, index: usize) -> Option<usize> {
    let at = self.ranges.partition_point(|r| r.end <= index);
    self.ranges.get(at).filter(|r| r.start <= index).map(|r| r.start)
  }

  pub fn min(&self) -> Option<usize> {
    self.ranges.first().map(|r| r.start)
  }

  /// One past the largest index, `usize::MAX` when unbounded.
  pub fn max(&self) -> Option<usize> {
    self.ranges.last().map(|r| r.end)
  }

  /// Number of indexes in the set. Saturates when unbounded.
  pub fn len(&self) -> usize {
    self.ranges.iter().fold(0usize, |n, r| n.saturating_add(r.end - r.start))
  }

  pub fn is_empty(&self) -> bool {
    self.ranges.is_empty()
  }

  pub fn is_unbounded(&self) -> bool {
    self.ranges.last().map_or(false, |r| r.end == UNBOUNDED)
  }

  pub fn ranges(&self) -> &[Range<usize>] {
    &self.ranges
  }

  pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
    self.ranges.iter().flat_map(|r| r.clone())
  }
}

impl FromIterator<usize> for IndexSet {
  fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
    let mut set = IndexSet::new();
    for index in iter {
      set.add_index(index);
    }
    set
  }
}

impl fmt::Display for IndexSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{{")?;
    for (i, r) in self.ranges.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      if r.end == UNBOUNDED {
        write!(f, "{}..", r.start)?;
      } else if r.end - r.start == 1 {
        write!(f, "{}", r.start)?;
      } else {
        write!(f, "{}..{}", r.start, r.end)?;
      }
    }
    write!(f, "}}")
  }
}
