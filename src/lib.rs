//! # rheap - A First-Fit Heap Allocator Library
//!
//! This crate provides a **first-fit, coalescing heap** that manages a single
//! backing store it owns outright. Callers ask for payload bytes with
//! [`Heap::acquire`] and hand them back with [`Heap::release`].
//!
//! ## Overview
//!
//! The store is covered by an address-ordered list of blocks. Each block is a
//! header followed by its payload, and the blocks leave no gaps:
//!
//! ```text
//!   Backing Store:
//!
//!   start                                                            end
//!   ┌────────┬──────────┬────────┬──────┬────────┬─────────────────────┐
//!   │ header │ payload  │ header │ pay. │ header │       payload       │
//!   │  used  │    A     │  free  │      │  used  │          B          │
//!   └────────┴──────────┴────────┴──────┴────────┴─────────────────────┘
//!            ▲                                   ▲
//!            └── HeapPtr of A                    └── HeapPtr of B
//!
//!   Σ (HEADER_SIZE + size) over every block == capacity
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rheap
//!   ├── block    - Header footprint, HeapPtr, BlockInfo
//!   ├── config   - HeapConfig (serde)
//!   ├── error    - AcquireError, ConfigError, InvariantViolation
//!   ├── growth   - GrowthHook, FixedCapacity, PageGrowth
//!   ├── heap     - Heap: acquire, release, split, merge
//!   └── shared   - SharedHeap, a Heap behind a mutex
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rheap::Heap;
//!
//! let mut heap = Heap::new(256).unwrap();
//!
//! let ptr = heap.acquire(5).unwrap();
//! heap.payload_mut(ptr).unwrap().copy_from_slice(b"hello");
//! assert_eq!(heap.payload(ptr).unwrap(), b"hello");
//!
//! heap.release(ptr);
//! assert_eq!(heap.blocks().count(), 1);
//! ```
//!
//! ## How It Works
//!
//! Allocation walks the list from the lowest address and takes the first free
//! block that is large enough. When that block is much larger than the
//! request, it is split:
//!
//! ```text
//!   Split (spare > 2 * HEADER_SIZE):
//!
//!   ┌────────┬──────────────────────────────┐
//!   │  free  │            old size          │
//!   └────────┴──────────────────────────────┘
//!                         │
//!                         ▼
//!   ┌────────┬──────────┬────────┬──────────┐
//!   │  used  │   size   │  free  │ old size │
//!   │        │          │        │ - size   │
//!   │        │          │        │ - header │
//!   └────────┴──────────┴────────┴──────────┘
//! ```
//!
//! Releasing a block merges it with the next block, then with the previous
//! one, whenever those are free. Two free blocks are never left side by side.
//!
//! If nothing fits, the heap asks its [`GrowthHook`]. The default,
//! [`FixedCapacity`], always declines; [`PageGrowth`] appends whole pages up
//! to a ceiling.
//!
//! ## Policies
//!
//! - **Zero-size requests** are rejected with [`AcquireError::ZeroSize`].
//! - **Foreign pointers**, pointers into the middle of a block, and **double
//!   releases** are ignored silently.
//!
//! ## Limitations
//!
//! - **Single owner**: `Heap` needs `&mut self`; wrap it in [`SharedHeap`] to
//!   share it between threads.
//! - **No realloc** and no alignment guarantees beyond natural struct alignment.
//! - **No hardening**: the hot path does not look for corruption.
//!   [`Heap::verify`] is there for tests and debugging.

mod block;
mod config;
mod error;
mod growth;
mod heap;
mod shared;

pub use block::{BlockInfo, HEADER_SIZE, HeapPtr};
pub use config::{DEFAULT_CAPACITY, HeapConfig};
pub use error::{AcquireError, ConfigError, InvariantViolation};
pub use growth::{FixedCapacity, Growth, GrowthHook, PageGrowth};
pub use heap::{Heap, HeapStats};
pub use shared::SharedHeap;
