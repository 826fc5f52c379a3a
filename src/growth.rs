//! Extension points for acquiring more backing memory.

use crate::error::ConfigError;

const FALLBACK_PAGE_SIZE: usize = 4096;

/// Asked by the heap when no free block can satisfy a request.
pub trait GrowthHook {
  /// Returns how many bytes to append to a store currently `current` bytes
  /// long, or `None` to decline.
  ///
  /// `needed` is the smallest extension that would satisfy the pending
  /// request: the request plus a header when the last block is used, or the
  /// shortfall of a free last block (never less than a header plus one byte).
  fn grow(
    &mut self,
    current: usize,
    needed: usize,
  ) -> Option<usize>;
}

impl<F> GrowthHook for F
where
  F: FnMut(usize, usize) -> Option<usize>,
{
  fn grow(
    &mut self,
    current: usize,
    needed: usize,
  ) -> Option<usize> {
    self(current, needed)
  }
}

/// Never grows. The heap stays at its initial capacity.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedCapacity;

impl GrowthHook for FixedCapacity {
  fn grow(
    &mut self,
    _current: usize,
    _needed: usize,
  ) -> Option<usize> {
    None
  }
}

/// Grows the store by whole pages until `max_capacity` is reached.
#[derive(Debug, Clone, Copy)]
pub struct PageGrowth {
  page_size: usize,
  max_capacity: usize,
}

impl PageGrowth {
  /// Uses the page size reported by the operating system.
  pub fn new(max_capacity: usize) -> Result<Self, ConfigError> {
    Self::with_page_size(system_page_size(), max_capacity)
  }

  pub fn with_page_size(
    page_size: usize,
    max_capacity: usize,
  ) -> Result<Self, ConfigError> {
    if !page_size.is_power_of_two() {
      return Err(ConfigError::InvalidPageSize(page_size));
    }

    Ok(Self {
      page_size,
      max_capacity,
    })
  }

  pub fn page_size(&self) -> usize {
    self.page_size
  }

  pub fn max_capacity(&self) -> usize {
    self.max_capacity
  }
}

impl GrowthHook for PageGrowth {
  fn grow(
    &mut self,
    current: usize,
    needed: usize,
  ) -> Option<usize> {
    let room = self.max_capacity.checked_sub(current)?;
    let pages = needed.checked_next_multiple_of(self.page_size)?;

    // Near the ceiling, a partial page still helps if it covers the request.
    let additional = pages.min(room);
    (additional >= needed).then_some(additional)
  }
}

/// Growth policy selected by [`HeapConfig`](crate::HeapConfig).
#[derive(Debug, Clone, Copy)]
pub enum Growth {
  Fixed(FixedCapacity),
  Pages(PageGrowth),
}

impl GrowthHook for Growth {
  fn grow(
    &mut self,
    current: usize,
    needed: usize,
  ) -> Option<usize> {
    match self {
      Growth::Fixed(fixed) => fixed.grow(current, needed),
      Growth::Pages(pages) => pages.grow(current, needed),
    }
  }
}

#[cfg(unix)]
fn system_page_size() -> usize {
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

  if size > 0 {
    size as usize
  } else {
    FALLBACK_PAGE_SIZE
  }
}

#[cfg(not(unix))]
fn system_page_size() -> usize {
  FALLBACK_PAGE_SIZE
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fixed_capacity_declines() {
    assert_eq!(FixedCapacity.grow(256, 1), None);
  }

  #[test]
  fn test_page_growth_rounds_to_pages() {
    let mut growth = PageGrowth::with_page_size(64, 1024).unwrap();

    assert_eq!(growth.grow(256, 1), Some(64));
    assert_eq!(growth.grow(256, 65), Some(128));
  }

  #[test]
  fn test_page_growth_stops_at_ceiling() {
    let mut growth = PageGrowth::with_page_size(64, 300).unwrap();

    assert_eq!(growth.grow(256, 40), Some(44));
    assert_eq!(growth.grow(256, 50), None);
    assert_eq!(growth.grow(300, 1), None);
    assert_eq!(growth.grow(400, 1), None);
  }

  #[test]
  fn test_page_size_must_be_power_of_two() {
    assert_eq!(
      PageGrowth::with_page_size(100, 1024).unwrap_err(),
      ConfigError::InvalidPageSize(100)
    );
  }

  #[test]
  fn test_system_page_size_is_usable() {
    let growth = PageGrowth::new(1 << 20).unwrap();

    assert!(growth.page_size().is_power_of_two());
  }

  #[test]
  fn test_closure_hook() {
    let mut calls = 0;
    let mut hook = |_current: usize, needed: usize| {
      calls += 1;
      Some(needed)
    };

    assert_eq!(GrowthHook::grow(&mut hook, 0, 48), Some(48));
    assert_eq!(calls, 1);
  }
}
