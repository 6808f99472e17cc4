//! # rbuddy - A Buddy-System Heap Allocator
//!
//! This crate provides a **buddy allocator** that serves allocations straight
//! from raw process memory: an arena carved from the program break with
//! `sbrk(2)`, plus private anonymous mappings (`mmap(2)`) for requests too
//! large for the arena.
//!
//! ## Overview
//!
//! Memory is handed out in power-of-two blocks. Every block starts with a
//! small header and belongs to a size class ("order"):
//!
//! ```text
//!   order:      0      1      2     ...      10
//!   block:    128 B  256 B  512 B   ...   128 KiB
//! ```
//!
//! A request picks the smallest order whose block fits the request plus the
//! header. When only bigger blocks are free, one is split in halves until
//! the right order is reached:
//!
//! ```text
//!   allocate(200)                                   → order 1
//!
//!   ┌───────────────────────────────────────────────┐
//!   │                 order 10 (free)               │
//!   └───────────────────────────────────────────────┘
//!                         │ split ×9
//!                         ▼
//!   ┌────┬────┬────────┬────────────────┬───────────┐
//!   │ ■1 │ □1 │   □2   │       □3       │ ... □9    │
//!   └────┴────┴────────┴────────────────┴───────────┘
//!     ▲
//!     └── allocated; every upper half stays free
//! ```
//!
//! Freeing a block merges it with its **buddy**, the block of the same order
//! whose address differs by exactly one bit (`addr ^ block_size(order)`),
//! for as long as that buddy is free too.
//!
//! ## Crate Structure
//!
//! ```text
//!   rbuddy
//!   ├── align      - align_to! macro
//!   ├── block      - Block header written in front of every payload
//!   ├── list       - Address-ordered intrusive BlockList
//!   ├── order      - Size classes and buddy arithmetic
//!   ├── table      - SizeClassTable: free/allocated lists per order
//!   ├── source     - MemorySource: sbrk/mmap, or a private reserved heap
//!   ├── buddy      - BuddyAllocator: allocate, free, resize
//!   ├── stats      - Stats snapshot
//!   ├── config     - Config (arena size, request ceiling)
//!   ├── error      - AllocError
//!   └── global     - LockedBuddy, a GlobalAlloc front-end
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rbuddy::BuddyAllocator;
//!
//! fn main() {
//!     let mut allocator = BuddyAllocator::new();
//!
//!     let ptr = allocator.allocate(200) as *mut u64;
//!     assert!(!ptr.is_null());
//!
//!     unsafe {
//!         *ptr = 42;
//!         allocator.free(ptr as *mut u8);
//!     }
//!
//!     println!("{}", allocator.stats());
//! }
//! ```
//!
//! ## How It Works
//!
//! On the first request the program break is pushed to the next multiple of
//! the arena size and extended by one arena (4 MiB by default), so every
//! 128 KiB block is aligned to its own size and buddy addresses can be
//! computed with a single XOR:
//!
//! ```text
//!   High Address ┌─────────────────────┐
//!                │       Stack         │
//!                │         ...         │
//!                ├─────────────────────┤ ← Program Break
//!                │  Arena (32 × 128K)  │
//!                ├─────────────────────┤ ← aligned to 4 MiB
//!                │      padding        │
//!                ├─────────────────────┤
//!                │  Heap (before us)   │
//!   Low Address  └─────────────────────┘
//! ```
//!
//! The arena never grows: once no free block is large enough, arena sized
//! requests fail with a null pointer. Requests above 128 KiB minus the header
//! each get their own mapping and are unmapped when freed.
//!
//! Statistics are rebuilt from the lists after every mutating call.
//!
//! ## Limitations
//!
//! - **Single-threaded core**: `BuddyAllocator` takes `&mut self`; use
//!   [`LockedBuddy`] to share it
//! - **Fixed arena**: the arena is never grown nor returned to the system
//! - **Unix-only**: Requires `libc`, `sbrk` and `mmap` (POSIX systems)
//!
//! ## Safety
//!
//! Freeing or resizing a pointer that did not come from the same allocator
//! is undefined behavior. Nothing else in the process may move the program
//! break while a [`SystemMemory`] backed allocator is alive.

pub mod align;
mod block;
mod buddy;
mod config;
mod error;
mod global;
mod list;
mod order;
mod source;
mod stats;
mod table;

pub use block::{Block, HEADER_SIZE, MAPPED_ORDER, MIN_ALIGN};
pub use buddy::BuddyAllocator;
pub use config::{
  Config, DEFAULT_ARENA_BLOCKS, DEFAULT_MAX_REQUEST, MAX_ARENA_BLOCKS, MAX_REQUEST_LIMIT,
};
pub use error::{AllocError, Result};
pub use global::LockedBuddy;
pub use list::BlockList;
pub use order::{
  MAX_BLOCK_SIZE, MAX_ORDER, MIN_BLOCK_SIZE, ORDER_COUNT, block_capacity, block_size, buddy_of,
  order_for,
};
pub use source::{MemorySource, ReservedHeap, SystemMemory};
pub use stats::Stats;
pub use table::SizeClassTable;
