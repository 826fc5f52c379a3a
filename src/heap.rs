use tracing::{debug, info, trace};

use crate::{
  block::{Block, BlockIndex, BlockInfo, HEADER_SIZE, HeapPtr},
  error::{AcquireError, ConfigError, InvariantViolation},
  growth::{FixedCapacity, GrowthHook},
};

/// Usage figures for a heap at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
  pub capacity: usize,
  pub blocks: usize,
  pub used_blocks: usize,
  /// Payload bytes held by used blocks.
  pub used_bytes: usize,
  /// Payload bytes held by free blocks.
  pub free_bytes: usize,
  pub largest_free: usize,
}

/// First-fit allocator over a single owned backing store.
///
/// Blocks form an address-ordered, gap-free doubly-linked list. Their headers
/// are kept in an arena and linked by index, while each one still reserves
/// [`HEADER_SIZE`] bytes of the store in front of its payload.
pub struct Heap<G = FixedCapacity> {
  store: Vec<u8>,
  blocks: Vec<Block>,
  vacant: Vec<BlockIndex>,
  first: BlockIndex,
  last: BlockIndex,
  growth: G,
}

impl Heap<FixedCapacity> {
  /// Creates a heap that never grows past `capacity` bytes.
  pub fn new(capacity: usize) -> Result<Self, ConfigError> {
    Self::with_growth(capacity, FixedCapacity)
  }
}

impl<G: GrowthHook> Heap<G> {
  pub fn with_growth(
    capacity: usize,
    growth: G,
  ) -> Result<Self, ConfigError> {
    if capacity <= HEADER_SIZE {
      return Err(ConfigError::CapacityTooSmall {
        capacity,
        minimum: HEADER_SIZE,
      });
    }

    let mut heap = Self {
      store: vec![0; capacity],
      blocks: Vec::new(),
      vacant: Vec::new(),
      first: BlockIndex(0),
      last: BlockIndex(0),
      growth,
    };
    heap.reset();

    Ok(heap)
  }

  /// Drops every allocation and covers the whole store with one free block.
  pub fn reset(&mut self) {
    self.blocks.clear();
    self.vacant.clear();
    self.blocks.push(Block::free(0, self.store.len() - HEADER_SIZE));
    self.first = BlockIndex(0);
    self.last = BlockIndex(0);

    trace!(capacity = self.store.len(), "heap initialized");
  }

  /// Hands out `size` payload bytes from the first free block that fits.
  pub fn acquire(
    &mut self,
    size: usize,
  ) -> Result<HeapPtr, AcquireError> {
    if size == 0 {
      return Err(AcquireError::ZeroSize);
    }

    loop {
      if let Some(index) = self.find_free_block(size) {
        // Remainders too small to be useful stay attached to the allocation.
        if self.block(index).size - size > 2 * HEADER_SIZE {
          self.split(index, size);
        }

        let block = self.block_mut(index);
        block.used = true;
        let ptr = HeapPtr::from_offset(block.payload_offset());

        trace!(size, offset = ptr.offset(), granted = block.size, "acquired");
        return Ok(ptr);
      }

      if !self.grow(size) {
        debug!(size, capacity = self.store.len(), "heap exhausted");
        return Err(AcquireError::Exhausted { requested: size });
      }
    }
  }

  /// Returns an allocation to the heap and coalesces it with free neighbours.
  ///
  /// Pointers outside the store, pointers that do not start a payload, and
  /// blocks that are already free are ignored.
  pub fn release(
    &mut self,
    ptr: HeapPtr,
  ) {
    let Some(header) = ptr
      .offset()
      .checked_sub(HEADER_SIZE)
      .filter(|header| *header < self.end())
    else {
      debug!(offset = ptr.offset(), "ignoring release outside the heap");
      return;
    };

    let Some(index) = self.find_block(header) else {
      debug!(offset = ptr.offset(), "ignoring release of a non-block pointer");
      return;
    };

    if !self.block(index).used {
      debug!(offset = ptr.offset(), "ignoring release of a free block");
      return;
    }

    self.block_mut(index).used = false;
    trace!(offset = ptr.offset(), size = self.block(index).size, "released");

    if let Some(next) = self.block(index).next
      && !self.block(next).used
    {
      self.merge(index, next);
    }

    if let Some(previous) = self.block(index).previous
      && !self.block(previous).used
    {
      self.merge(previous, index);
    }
  }

  /// Payload of a live allocation.
  pub fn payload(
    &self,
    ptr: HeapPtr,
  ) -> Option<&[u8]> {
    let block = self.live_block(ptr)?;
    self.store.get(block.payload_offset()..block.end())
  }

  pub fn payload_mut(
    &mut self,
    ptr: HeapPtr,
  ) -> Option<&mut [u8]> {
    let range = self.live_block(ptr).map(|block| block.payload_offset()..block.end())?;
    self.store.get_mut(range)
  }

  /// Always zero: offsets are relative to the store.
  pub fn start(&self) -> usize {
    0
  }

  pub fn end(&self) -> usize {
    self.store.len()
  }

  pub fn capacity(&self) -> usize {
    self.store.len()
  }

  pub fn growth(&self) -> &G {
    &self.growth
  }

  /// Blocks in address order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    self.walk().map(|index| self.block(index).info())
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      capacity: self.capacity(),
      ..HeapStats::default()
    };

    for block in self.blocks() {
      stats.blocks += 1;
      if block.used {
        stats.used_blocks += 1;
        stats.used_bytes += block.size;
      } else {
        stats.free_bytes += block.size;
        stats.largest_free = stats.largest_free.max(block.size);
      }
    }

    stats
  }

  /// Walks the whole list and checks its structural invariants.
  pub fn verify(&self) -> Result<(), InvariantViolation> {
    let mut expected = self.start();
    let mut accounted = 0;
    let mut previous: Option<BlockIndex> = None;

    for index in self.walk() {
      let block = self.block(index);

      if block.offset != expected {
        return Err(InvariantViolation::Gap {
          offset: block.offset,
          expected,
        });
      }
      if block.previous != previous {
        return Err(InvariantViolation::BrokenLink {
          offset: block.offset,
        });
      }
      if let Some(previous) = previous.map(|previous| self.block(previous))
        && !previous.used
        && !block.used
      {
        return Err(InvariantViolation::AdjacentFree {
          offset: previous.offset,
          next: block.offset,
        });
      }

      accounted += block.size + HEADER_SIZE;
      expected = block.end();
      previous = Some(index);
    }

    if previous != Some(self.last) {
      return Err(InvariantViolation::LastBlockMismatch {
        actual: self.block(self.last).offset,
        expected: previous.map_or(0, |previous| self.block(previous).offset),
      });
    }
    if accounted != self.capacity() {
      return Err(InvariantViolation::AccountingMismatch {
        accounted,
        capacity: self.capacity(),
      });
    }

    Ok(())
  }

  fn walk(&self) -> impl Iterator<Item = BlockIndex> + '_ {
    std::iter::successors(Some(self.first), |index| self.block(*index).next)
  }

  fn block(
    &self,
    index: BlockIndex,
  ) -> &Block {
    &self.blocks[index.0]
  }

  fn block_mut(
    &mut self,
    index: BlockIndex,
  ) -> &mut Block {
    &mut self.blocks[index.0]
  }

  fn find_free_block(
    &self,
    size: usize,
  ) -> Option<BlockIndex> {
    self.walk().find(|index| {
      let block = self.block(*index);
      !block.used && block.size >= size
    })
  }

  fn find_block(
    &self,
    header: usize,
  ) -> Option<BlockIndex> {
    self
      .walk()
      .take_while(|index| self.block(*index).offset <= header)
      .find(|index| self.block(*index).offset == header)
  }

  fn live_block(
    &self,
    ptr: HeapPtr,
  ) -> Option<&Block> {
    let header = ptr.offset().checked_sub(HEADER_SIZE)?;
    let block = self.block(self.find_block(header)?);
    block.used.then_some(block)
  }

  fn insert(
    &mut self,
    block: Block,
  ) -> BlockIndex {
    match self.vacant.pop() {
      Some(index) => {
        self.blocks[index.0] = block;
        index
      }
      None => {
        self.blocks.push(block);
        BlockIndex(self.blocks.len() - 1)
      }
    }
  }

  /// Carves `index` into `size` payload bytes and a free remainder after it.
  fn split(
    &mut self,
    index: BlockIndex,
    size: usize,
  ) {
    let block = self.block(index);
    debug_assert!(block.size >= size + HEADER_SIZE);

    let remainder = Block {
      offset: block.payload_offset() + size,
      size: block.size - size - HEADER_SIZE,
      used: false,
      previous: Some(index),
      next: block.next,
    };
    let after = block.next;
    let right = self.insert(remainder);

    if let Some(after) = after {
      self.block_mut(after).previous = Some(right);
    }

    let block = self.block_mut(index);
    block.next = Some(right);
    block.size = size;

    if self.last == index {
      self.last = right;
    }

    trace!(
      offset = self.block(index).offset,
      size,
      remainder = self.block(right).size,
      "split"
    );
  }

  /// Absorbs `second` into `first`. Both must be free and adjacent.
  fn merge(
    &mut self,
    first: BlockIndex,
    second: BlockIndex,
  ) {
    let absorbed = self.block(second).clone();
    debug_assert!(!absorbed.used && !self.block(first).used);
    debug_assert_eq!(self.block(first).next, Some(second));
    debug_assert_eq!(self.block(first).end(), absorbed.offset);

    if let Some(after) = absorbed.next {
      self.block_mut(after).previous = Some(first);
    }

    let block = self.block_mut(first);
    block.next = absorbed.next;
    block.size += absorbed.size + HEADER_SIZE;

    if self.last == second {
      self.last = first;
    }
    self.vacant.push(second);

    trace!(
      offset = self.block(first).offset,
      size = self.block(first).size,
      "merged"
    );
  }

  /// Asks the growth hook for more store and links it in after the last block.
  fn grow(
    &mut self,
    size: usize,
  ) -> bool {
    let current = self.store.len();
    let tail = self.block(self.last);
    // A free tail absorbs the extension, so only the shortfall is needed.
    let needed = if tail.used {
      size.saturating_add(HEADER_SIZE)
    } else {
      size.saturating_sub(tail.size).max(HEADER_SIZE + 1)
    };

    let Some(additional) = self.growth.grow(current, needed) else {
      return false;
    };
    if additional <= HEADER_SIZE {
      return false;
    }
    let Some(capacity) = current
      .checked_add(additional)
      .filter(|capacity| *capacity <= isize::MAX as usize)
    else {
      return false;
    };

    self.store.resize(capacity, 0);

    let last = self.last;
    let mut block = Block::free(current, additional - HEADER_SIZE);
    block.previous = Some(last);
    let appended = self.insert(block);
    self.block_mut(last).next = Some(appended);
    self.last = appended;

    if !self.block(last).used {
      self.merge(last, appended);
    }

    info!(additional, capacity, "heap grew");
    true
  }
}

impl<G> std::fmt::Debug for Heap<G> {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> std::fmt::Result {
    let blocks: Vec<BlockInfo> =
      std::iter::successors(Some(self.first), |index| self.blocks[index.0].next)
        .map(|index| self.blocks[index.0].info())
        .collect();

    f.debug_struct("Heap")
      .field("capacity", &self.store.len())
      .field("blocks", &blocks)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::growth::PageGrowth;

  const CAPACITY: usize = 256;

  fn heap() -> Heap {
    Heap::new(CAPACITY).unwrap()
  }

  fn layout(heap: &Heap<impl GrowthHook>) -> Vec<(usize, bool)> {
    heap.blocks().map(|block| (block.size, block.used)).collect()
  }

  #[test]
  fn test_init_single_free_block() {
    let heap = heap();

    assert_eq!(layout(&heap), vec![(CAPACITY - HEADER_SIZE, false)]);
    assert_eq!(heap.start(), 0);
    assert_eq!(heap.end(), CAPACITY);
    heap.verify().unwrap();
  }

  #[test]
  fn test_capacity_must_hold_a_header() {
    assert_eq!(
      Heap::new(HEADER_SIZE).unwrap_err(),
      ConfigError::CapacityTooSmall {
        capacity: HEADER_SIZE,
        minimum: HEADER_SIZE,
      }
    );
    assert!(Heap::new(HEADER_SIZE + 1).is_ok());
  }

  #[test]
  fn test_acquire_splits_large_block() {
    let mut heap = heap();

    let ptr = heap.acquire(16).unwrap();

    assert_eq!(ptr.offset(), HEADER_SIZE);
    assert_eq!(
      layout(&heap),
      vec![(16, true), (CAPACITY - 2 * HEADER_SIZE - 16, false)]
    );
    heap.verify().unwrap();
  }

  #[test]
  fn test_acquire_keeps_small_remainder() {
    let mut heap = heap();
    let whole = CAPACITY - HEADER_SIZE;

    // Exactly 2 * HEADER_SIZE spare: not worth splitting.
    heap.acquire(whole - 2 * HEADER_SIZE).unwrap();

    assert_eq!(layout(&heap), vec![(whole, true)]);
  }

  #[test]
  fn test_acquire_splits_just_past_threshold() {
    let mut heap = heap();
    let whole = CAPACITY - HEADER_SIZE;

    heap.acquire(whole - 2 * HEADER_SIZE - 1).unwrap();

    assert_eq!(
      layout(&heap),
      vec![(whole - 2 * HEADER_SIZE - 1, true), (HEADER_SIZE + 1, false)]
    );
    heap.verify().unwrap();
  }

  #[test]
  fn test_zero_size_is_rejected() {
    let mut heap = heap();

    assert_eq!(heap.acquire(0), Err(AcquireError::ZeroSize));
    assert_eq!(layout(&heap), vec![(CAPACITY - HEADER_SIZE, false)]);
  }

  #[test]
  fn test_exhaustion() {
    let mut heap = heap();

    heap.acquire(CAPACITY - HEADER_SIZE).unwrap();

    assert_eq!(
      heap.acquire(1),
      Err(AcquireError::Exhausted { requested: 1 })
    );
    heap.verify().unwrap();
  }

  #[test]
  fn test_first_fit_reuses_low_address() {
    let mut heap = heap();

    let a = heap.acquire(32).unwrap();
    let b = heap.acquire(16).unwrap();
    heap.release(a);
    let c = heap.acquire(24).unwrap();

    assert_eq!(c, a);
    assert_ne!(c, b);
    heap.verify().unwrap();
  }

  #[test]
  fn test_release_coalesces_both_sides() {
    let mut heap = heap();

    let a = heap.acquire(8).unwrap();
    let b = heap.acquire(8).unwrap();
    let c = heap.acquire(8).unwrap();
    let _guard = heap.acquire(8).unwrap();

    heap.release(a);
    heap.release(c);
    assert_eq!(
      layout(&heap)[..4],
      [(8, false), (8, true), (8, false), (8, true)]
    );

    heap.release(b);
    assert_eq!(layout(&heap)[..2], [(3 * 8 + 2 * HEADER_SIZE, false), (8, true)]);
    heap.verify().unwrap();
  }

  #[test]
  fn test_release_everything_restores_single_block() {
    let mut heap = heap();

    let ptrs: Vec<HeapPtr> = (0..4).map(|_| heap.acquire(8).unwrap()).collect();
    for ptr in ptrs.into_iter().rev() {
      heap.release(ptr);
      heap.verify().unwrap();
    }

    assert_eq!(layout(&heap), vec![(CAPACITY - HEADER_SIZE, false)]);
  }

  #[test]
  fn test_foreign_release_is_ignored() {
    let mut heap = heap();
    let ptr = heap.acquire(16).unwrap();
    let before = layout(&heap);

    heap.release(HeapPtr::from_offset(0));
    heap.release(HeapPtr::from_offset(CAPACITY + HEADER_SIZE));
    heap.release(HeapPtr::from_offset(usize::MAX));
    heap.release(HeapPtr::from_offset(ptr.offset() + 1));

    assert_eq!(layout(&heap), before);
    assert!(heap.payload(ptr).is_some());
  }

  #[test]
  fn test_double_release_is_ignored() {
    let mut heap = heap();

    let a = heap.acquire(16).unwrap();
    let b = heap.acquire(16).unwrap();
    heap.release(a);
    let before = layout(&heap);
    heap.release(a);

    assert_eq!(layout(&heap), before);
    assert!(heap.payload(b).is_some());
    heap.verify().unwrap();
  }

  #[test]
  fn test_payload_round_trip() {
    let mut heap = heap();

    let ptr = heap.acquire(6).unwrap();
    heap.payload_mut(ptr).unwrap().copy_from_slice(b"rheap!");

    assert_eq!(heap.payload(ptr).unwrap(), b"rheap!");

    heap.release(ptr);
    assert!(heap.payload(ptr).is_none());
    assert!(heap.payload_mut(ptr).is_none());
  }

  #[test]
  fn test_reset_drops_allocations() {
    let mut heap = heap();

    let ptr = heap.acquire(16).unwrap();
    heap.acquire(16).unwrap();
    heap.reset();

    assert!(heap.payload(ptr).is_none());
    assert_eq!(layout(&heap), vec![(CAPACITY - HEADER_SIZE, false)]);
  }

  #[test]
  fn test_stats() {
    let mut heap = heap();

    heap.acquire(16).unwrap();
    let stats = heap.stats();

    assert_eq!(
      stats,
      HeapStats {
        capacity: CAPACITY,
        blocks: 2,
        used_blocks: 1,
        used_bytes: 16,
        free_bytes: CAPACITY - 2 * HEADER_SIZE - 16,
        largest_free: CAPACITY - 2 * HEADER_SIZE - 16,
      }
    );
  }

  #[test]
  fn test_stats_largest_free_picks_biggest_hole() {
    let mut heap = heap();

    let a = heap.acquire(40).unwrap();
    heap.acquire(8).unwrap();
    let c = heap.acquire(8).unwrap();
    heap.acquire(CAPACITY - 4 * HEADER_SIZE - 56).unwrap();
    heap.release(c);
    heap.release(a);

    assert_eq!(
      heap.stats(),
      HeapStats {
        capacity: CAPACITY,
        blocks: 4,
        used_blocks: 2,
        used_bytes: 8 + CAPACITY - 4 * HEADER_SIZE - 56,
        free_bytes: 48,
        largest_free: 40,
      }
    );
  }

  #[test]
  fn test_growth_extends_and_merges_tail() {
    let growth = PageGrowth::with_page_size(256, 1024).unwrap();
    let mut heap = Heap::with_growth(CAPACITY, growth).unwrap();

    let ptr = heap.acquire(300).unwrap();

    // The tail is free, so one page merged into it is enough.
    assert_eq!(ptr.offset(), HEADER_SIZE);
    assert_eq!(heap.capacity(), 2 * CAPACITY);
    heap.verify().unwrap();
  }

  #[test]
  fn test_growth_near_ceiling_counts_free_tail() {
    let growth = PageGrowth::with_page_size(256, 2 * CAPACITY).unwrap();
    let mut heap = Heap::with_growth(CAPACITY, growth).unwrap();

    let ptr = heap.acquire(300).unwrap();

    assert_eq!(ptr.offset(), HEADER_SIZE);
    assert_eq!(heap.capacity(), 2 * CAPACITY);
    assert_eq!(
      layout(&heap),
      vec![(300, true), (2 * CAPACITY - 2 * HEADER_SIZE - 300, false)]
    );
    heap.verify().unwrap();
  }

  #[test]
  fn test_growth_asks_only_for_shortfall() {
    let mut asked = Vec::new();
    let hook = |_current: usize, needed: usize| {
      asked.push(needed);
      Some(needed)
    };
    let mut heap = Heap::with_growth(CAPACITY, hook).unwrap();

    heap.acquire(CAPACITY).unwrap();
    heap.acquire(100).unwrap();
    drop(heap);

    // First the free tail is CAPACITY - HEADER_SIZE bytes, then it is used.
    assert_eq!(asked, vec![HEADER_SIZE + 1, 100 + HEADER_SIZE]);
  }

  #[test]
  fn test_oversized_extension_is_declined() {
    let hook = |_current: usize, _needed: usize| Some(isize::MAX as usize);
    let mut heap = Heap::with_growth(CAPACITY, hook).unwrap();

    assert_eq!(
      heap.acquire(CAPACITY),
      Err(AcquireError::Exhausted { requested: CAPACITY })
    );
    assert_eq!(heap.capacity(), CAPACITY);
  }

  #[test]
  fn test_growth_appends_after_used_tail() {
    let growth = PageGrowth::with_page_size(256, 1024).unwrap();
    let mut heap = Heap::with_growth(CAPACITY, growth).unwrap();

    heap.acquire(CAPACITY - HEADER_SIZE).unwrap();
    let ptr = heap.acquire(100).unwrap();

    assert_eq!(ptr.offset(), CAPACITY + HEADER_SIZE);
    assert_eq!(heap.capacity(), 2 * CAPACITY);
    heap.verify().unwrap();
  }

  #[test]
  fn test_growth_declined_past_ceiling() {
    let growth = PageGrowth::with_page_size(256, 512).unwrap();
    let mut heap = Heap::with_growth(CAPACITY, growth).unwrap();

    assert_eq!(
      heap.acquire(1024),
      Err(AcquireError::Exhausted { requested: 1024 })
    );
    assert_eq!(heap.capacity(), CAPACITY);
  }

  #[test]
  fn test_tiny_extension_is_declined() {
    let hook = |_current: usize, _needed: usize| Some(HEADER_SIZE);
    let mut heap = Heap::with_growth(CAPACITY, hook).unwrap();

    assert!(heap.acquire(CAPACITY).is_err());
    assert_eq!(heap.capacity(), CAPACITY);
  }
}
