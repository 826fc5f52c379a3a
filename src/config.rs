use serde::Deserialize;

use crate::{
  error::ConfigError,
  growth::{FixedCapacity, Growth, PageGrowth},
  heap::Heap,
};

/// Backing store size used when nothing else is configured.
pub const DEFAULT_CAPACITY: usize = 256;

/// Settings for building a [`Heap`].
///
/// Without `max_capacity` the heap keeps its initial capacity forever. With
/// it, the store grows by whole pages up to that many bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeapConfig {
  pub capacity: usize,
  pub max_capacity: Option<usize>,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      capacity: DEFAULT_CAPACITY,
      max_capacity: None,
    }
  }
}

impl HeapConfig {
  pub fn build(&self) -> Result<Heap<Growth>, ConfigError> {
    let growth = match self.max_capacity {
      None => Growth::Fixed(FixedCapacity),
      Some(max_capacity) if max_capacity < self.capacity => {
        return Err(ConfigError::MaxCapacityBelowCapacity {
          capacity: self.capacity,
          max_capacity,
        });
      }
      Some(max_capacity) => Growth::Pages(PageGrowth::new(max_capacity)?),
    };

    Heap::with_growth(self.capacity, growth)
  }
}
