use thiserror::Error;

/// Why [`Heap::acquire`](crate::Heap::acquire) could not hand out memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AcquireError {
  #[error("zero-size allocations are not supported")]
  ZeroSize,
  #[error("no free block can hold {requested} bytes and the heap could not grow")]
  Exhausted { requested: usize },
}

/// Rejected heap or growth configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("capacity of {capacity} bytes cannot hold a block, need more than {minimum}")]
  CapacityTooSmall { capacity: usize, minimum: usize },
  #[error("max capacity {max_capacity} is below the initial capacity {capacity}")]
  MaxCapacityBelowCapacity { capacity: usize, max_capacity: usize },
  #[error("page size {0} is not a power of two")]
  InvalidPageSize(usize),
}

/// A broken structural invariant, reported by [`Heap::verify`](crate::Heap::verify).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvariantViolation {
  #[error("block at {offset} should start at {expected}")]
  Gap { offset: usize, expected: usize },
  #[error("block at {offset} has a previous link that does not point back")]
  BrokenLink { offset: usize },
  #[error("last block is at {actual}, list ends at {expected}")]
  LastBlockMismatch { actual: usize, expected: usize },
  #[error("blocks account for {accounted} bytes, store holds {capacity}")]
  AccountingMismatch { accounted: usize, capacity: usize },
  #[error("free blocks at {offset} and {next} are adjacent")]
  AdjacentFree { offset: usize, next: usize },
}
