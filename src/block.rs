use std::mem;

/// In-band footprint of a block header.
///
/// The fields themselves live in the heap's block arena, but every block still
/// reserves this many bytes of the backing store in front of its payload, so
/// offsets and size accounting match a classic intrusive free list.
#[allow(dead_code)]
#[repr(C)]
struct HeaderLayout {
  used: bool,
  size: usize,
  previous: usize,
  next: usize,
}

/// Bytes reserved in front of every payload.
pub const HEADER_SIZE: usize = mem::size_of::<HeaderLayout>();

/// Stable position of a block inside the heap's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockIndex(pub usize);

#[derive(Debug, Clone)]
pub(crate) struct Block {
  /// Offset of the header from the start of the store.
  pub offset: usize,
  pub size: usize,
  pub used: bool,
  pub previous: Option<BlockIndex>,
  pub next: Option<BlockIndex>,
}

impl Block {
  pub fn free(
    offset: usize,
    size: usize,
  ) -> Self {
    Self {
      offset,
      size,
      used: false,
      previous: None,
      next: None,
    }
  }

  pub fn payload_offset(&self) -> usize {
    self.offset + HEADER_SIZE
  }

  /// Offset one past the last payload byte, where the next header must begin.
  pub fn end(&self) -> usize {
    self.payload_offset() + self.size
  }

  pub fn info(&self) -> BlockInfo {
    BlockInfo {
      offset: self.offset,
      size: self.size,
      used: self.used,
    }
  }
}

/// Snapshot of one block, as yielded by [`Heap::blocks`](crate::Heap::blocks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Header offset from the start of the store.
  pub offset: usize,
  /// Payload bytes, header excluded.
  pub size: usize,
  pub used: bool,
}

impl BlockInfo {
  pub fn payload_offset(&self) -> usize {
    self.offset + HEADER_SIZE
  }
}

/// A pointer into a heap, expressed as the payload offset from the start of
/// the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeapPtr(usize);

impl HeapPtr {
  /// Wraps a raw offset. Nothing is checked here: offsets that do not name a
  /// live allocation are ignored by [`Heap::release`](crate::Heap::release).
  pub const fn from_offset(offset: usize) -> Self {
    Self(offset)
  }

  pub const fn offset(self) -> usize {
    self.0
  }
}
