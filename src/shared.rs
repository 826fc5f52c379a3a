use parking_lot::Mutex;

use crate::{
  block::HeapPtr,
  error::AcquireError,
  growth::{FixedCapacity, GrowthHook},
  heap::Heap,
};

/// A [`Heap`] behind one coarse lock, for callers on several threads.
///
/// Every operation holds the lock for its whole duration, so the list is
/// never observed mid-edit.
pub struct SharedHeap<G = FixedCapacity> {
  heap: Mutex<Heap<G>>,
}

impl<G: GrowthHook> SharedHeap<G> {
  pub fn new(heap: Heap<G>) -> Self {
    Self {
      heap: Mutex::new(heap),
    }
  }

  pub fn acquire(
    &self,
    size: usize,
  ) -> Result<HeapPtr, AcquireError> {
    self.heap.lock().acquire(size)
  }

  pub fn release(
    &self,
    ptr: HeapPtr,
  ) {
    self.heap.lock().release(ptr)
  }

  /// Runs `f` with exclusive access, e.g. to fill a payload.
  pub fn with<R>(
    &self,
    f: impl FnOnce(&mut Heap<G>) -> R,
  ) -> R {
    f(&mut self.heap.lock())
  }

  pub fn into_inner(self) -> Heap<G> {
    self.heap.into_inner()
  }
}

impl<G: GrowthHook> From<Heap<G>> for SharedHeap<G> {
  fn from(heap: Heap<G>) -> Self {
    Self::new(heap)
  }
}
