//! `GlobalAlloc` front-end.
//!
//! ```rust,ignore
//! use rbuddy::LockedBuddy;
//!
//! #[global_allocator]
//! static ALLOCATOR: LockedBuddy = LockedBuddy::new();
//! ```
//!
//! The buddy allocator itself is single-threaded; every call here goes
//! through a spin lock. Installing a logger that allocates while trace
//! logging is enabled would re-enter the lock and deadlock.

use std::{
  alloc::{GlobalAlloc, Layout},
  cmp, mem, ptr,
};

use spin::Mutex;

use crate::{
  block::MIN_ALIGN,
  buddy::BuddyAllocator,
  config::Config,
  source::{MemorySource, SystemMemory},
  stats::Stats,
};

/// A [`BuddyAllocator`] behind a spin lock.
///
/// Alignments up to [`MIN_ALIGN`] are served directly. Larger ones
/// over-allocate and keep the pointer to free in the word just below the
/// address handed out:
///
/// ```text
///   raw                       aligned
///   ▼                         ▼
///   ┌────────────┬───────────┬──────────────────────┐
///   │  padding   │ raw (ptr) │ layout.size() bytes  │
///   └────────────┴───────────┴──────────────────────┘
/// ```
pub struct LockedBuddy<S: MemorySource = SystemMemory> {
  inner: Mutex<BuddyAllocator<S>>,
}

impl LockedBuddy<SystemMemory> {
  pub const fn new() -> Self {
    Self::from_allocator(BuddyAllocator::with_config(SystemMemory, Config::new()))
  }
}

impl Default for LockedBuddy<SystemMemory> {
  fn default() -> Self {
    Self::new()
  }
}

impl<S: MemorySource> LockedBuddy<S> {
  pub const fn from_allocator(allocator: BuddyAllocator<S>) -> Self {
    Self {
      inner: Mutex::new(allocator),
    }
  }

  pub fn stats(&self) -> Stats {
    self.inner.lock().stats()
  }

  /// Runs `f` with exclusive access to the wrapped allocator.
  pub fn with<R>(
    &self,
    f: impl FnOnce(&mut BuddyAllocator<S>) -> R,
  ) -> R {
    f(&mut *self.inner.lock())
  }
}

fn is_over_aligned(layout: &Layout) -> bool {
  layout.align() > MIN_ALIGN
}

/// Bytes to request so that an aligned address with a spare word below it
/// fits `layout`.
fn padded_size(layout: &Layout) -> Option<usize> {
  layout.size().checked_add(layout.align())
}

/// Picks the aligned address inside `raw` and records `raw` below it.
unsafe fn stash(
  raw: *mut u8,
  align: usize,
) -> *mut u8 {
  unsafe {
    let offset = raw.add(mem::size_of::<usize>()).align_offset(align);
    let aligned = raw.add(mem::size_of::<usize>() + offset);

    (aligned as *mut *mut u8).sub(1).write(raw);
    aligned
  }
}

unsafe fn unstash(aligned: *mut u8) -> *mut u8 {
  unsafe { (aligned as *mut *mut u8).sub(1).read() }
}

unsafe impl<S: MemorySource> GlobalAlloc for LockedBuddy<S> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    let mut allocator = self.inner.lock();

    if !is_over_aligned(&layout) {
      return allocator.allocate(layout.size());
    }

    let Some(size) = padded_size(&layout) else {
      return ptr::null_mut();
    };

    let raw = allocator.allocate(size);
    if raw.is_null() {
      return raw;
    }

    unsafe { stash(raw, layout.align()) }
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
  ) {
    let mut allocator = self.inner.lock();

    unsafe {
      if is_over_aligned(&layout) {
        allocator.free(unstash(ptr));
      } else {
        allocator.free(ptr);
      }
    }
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if !is_over_aligned(&layout) {
      return self.inner.lock().allocate_zeroed(1, layout.size());
    }

    unsafe {
      let ptr = self.alloc(layout);
      if !ptr.is_null() {
        ptr.write_bytes(0, layout.size());
      }
      ptr
    }
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    if !is_over_aligned(&layout) {
      return unsafe { self.inner.lock().resize(ptr, new_size) };
    }

    unsafe {
      let Ok(new_layout) = Layout::from_size_align(new_size, layout.align()) else {
        return ptr::null_mut();
      };

      let moved = self.alloc(new_layout);
      if !moved.is_null() {
        ptr::copy_nonoverlapping(ptr, moved, cmp::min(layout.size(), new_size));
        self.dealloc(ptr, layout);
      }
      moved
    }
  }
}
