//! Where the allocator gets its raw memory from.
//!
//! The arena comes from moving a program break forward, oversized blocks
//! come from anonymous mappings. [`SystemMemory`] talks to the real process
//! break through `sbrk(2)`; [`ReservedHeap`] keeps a private break inside
//! one big reservation so several allocators can live in the same process.

use std::ptr::{self, NonNull};

use libc::{
  MAP_ANONYMOUS, MAP_FAILED, MAP_NORESERVE, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, intptr_t,
  mmap, munmap, sbrk,
};
use log::warn;

use crate::error::{AllocError, Result};

/// Break and mapping primitives consumed by the allocator.
pub trait MemorySource {
  /// Current end of the heap.
  fn program_break(&mut self) -> Result<usize>;

  /// Moves the break forward by `increment` bytes and returns the old break.
  ///
  /// # Safety
  ///
  /// The returned range becomes owned by the caller.
  unsafe fn extend_break(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>>;

  /// Maps `len` private, anonymous, read/write bytes.
  ///
  /// # Safety
  ///
  /// The mapping must later be released with [`MemorySource::unmap`].
  unsafe fn map(
    &mut self,
    len: usize,
  ) -> Result<NonNull<u8>>;

  /// Releases a mapping obtained from [`MemorySource::map`].
  ///
  /// # Safety
  ///
  /// `addr` and `len` must describe exactly one live mapping.
  unsafe fn unmap(
    &mut self,
    addr: NonNull<u8>,
    len: usize,
  );
}

unsafe fn map_anonymous(
  len: usize,
  flags: i32,
) -> Result<NonNull<u8>> {
  let addr = unsafe {
    mmap(
      ptr::null_mut(),
      len,
      PROT_READ | PROT_WRITE,
      MAP_PRIVATE | MAP_ANONYMOUS | flags,
      -1,
      0,
    )
  };

  if addr == MAP_FAILED {
    let err = AllocError::last_os_error("mmap");
    warn!("mmap of {len} bytes failed: {err}");
    return Err(err);
  }

  NonNull::new(addr as *mut u8).ok_or(AllocError::SystemResource { call: "mmap", errno: 0 })
}

unsafe fn unmap_anonymous(
  addr: NonNull<u8>,
  len: usize,
) {
  if unsafe { munmap(addr.as_ptr() as *mut c_void, len) } != 0 {
    warn!("munmap of {len} bytes at {addr:?} failed: {}", AllocError::last_os_error("munmap"));
  }
}

/// The process heap, driven through `sbrk(2)`, and `mmap(2)`.
///
/// Nothing else in the process may move the break while an allocator built
/// on this source is alive, or buddy arithmetic breaks down.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemory;

impl MemorySource for SystemMemory {
  fn program_break(&mut self) -> Result<usize> {
    let address = unsafe { sbrk(0) };

    if address == usize::MAX as *mut c_void {
      return Err(AllocError::last_os_error("sbrk"));
    }

    Ok(address as usize)
  }

  unsafe fn extend_break(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>> {
    let increment = intptr_t::try_from(increment).map_err(|_| AllocError::SystemResource {
      call: "sbrk",
      errno: libc::ENOMEM,
    })?;

    let address = unsafe { sbrk(increment) };

    if address == usize::MAX as *mut c_void {
      let err = AllocError::last_os_error("sbrk");
      warn!("sbrk({increment}) failed: {err}");
      return Err(err);
    }

    NonNull::new(address as *mut u8).ok_or(AllocError::SystemResource { call: "sbrk", errno: 0 })
  }

  unsafe fn map(
    &mut self,
    len: usize,
  ) -> Result<NonNull<u8>> {
    unsafe { map_anonymous(len, 0) }
  }

  unsafe fn unmap(
    &mut self,
    addr: NonNull<u8>,
    len: usize,
  ) {
    unsafe { unmap_anonymous(addr, len) }
  }
}

/// A private program break inside a single reserved mapping.
///
/// ```text
///   base                 break                         base + capacity
///   ┌────────────────────┬─────────────────────────────┐
///   │  handed out        │          reserved           │
///   └────────────────────┴─────────────────────────────┘
/// ```
///
/// Mappings are real `mmap(2)` calls; the source counts the live ones so
/// tests can tell whether a block was unmapped.
#[derive(Debug)]
pub struct ReservedHeap {
  base: NonNull<u8>,
  capacity: usize,
  brk: usize,
  live_mappings: usize,
}

impl ReservedHeap {
  /// Reserves `capacity` bytes of address space. Pages are only backed
  /// once touched.
  pub fn new(capacity: usize) -> Result<Self> {
    let base = unsafe { map_anonymous(capacity, MAP_NORESERVE)? };

    Ok(Self {
      base,
      capacity,
      brk: 0,
      live_mappings: 0,
    })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes between the start of the reservation and the current break.
  pub fn used(&self) -> usize {
    self.brk
  }

  /// Mappings created through [`MemorySource::map`] and not yet unmapped.
  pub fn live_mappings(&self) -> usize {
    self.live_mappings
  }
}

impl MemorySource for ReservedHeap {
  fn program_break(&mut self) -> Result<usize> {
    Ok(self.base.as_ptr() as usize + self.brk)
  }

  unsafe fn extend_break(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>> {
    if increment > self.capacity - self.brk {
      warn!(
        "reserved heap exhausted: {increment} bytes requested, {} left",
        self.capacity - self.brk
      );
      return Err(AllocError::SystemResource { call: "sbrk", errno: libc::ENOMEM });
    }

    let old = unsafe { self.base.add(self.brk) };
    self.brk += increment;
    Ok(old)
  }

  unsafe fn map(
    &mut self,
    len: usize,
  ) -> Result<NonNull<u8>> {
    let addr = unsafe { map_anonymous(len, 0)? };
    self.live_mappings += 1;
    Ok(addr)
  }

  unsafe fn unmap(
    &mut self,
    addr: NonNull<u8>,
    len: usize,
  ) {
    unsafe { unmap_anonymous(addr, len) };
    self.live_mappings -= 1;
  }
}

impl Drop for ReservedHeap {
  fn drop(&mut self) {
    unsafe { unmap_anonymous(self.base, self.capacity) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_reserved_heap_break() {
    let mut heap = ReservedHeap::new(1 << 20).unwrap();
    let start = heap.program_break().unwrap();

    unsafe {
      let old = heap.extend_break(4096).unwrap();
      assert_eq!(old.as_ptr() as usize, start);

      old.as_ptr().write_bytes(0xAB, 4096);
      assert_eq!(*old.as_ptr().add(4095), 0xAB);
    }

    assert_eq!(heap.program_break().unwrap(), start + 4096);
    assert_eq!(heap.used(), 4096);
  }

  #[test]
  fn test_reserved_heap_exhaustion_keeps_break() {
    let mut heap = ReservedHeap::new(8192).unwrap();
    let start = heap.program_break().unwrap();

    let err = unsafe { heap.extend_break(8193) }.unwrap_err();

    assert!(matches!(err, AllocError::SystemResource { call: "sbrk", .. }));
    assert_eq!(heap.program_break().unwrap(), start);
  }

  #[test]
  fn test_map_and_unmap() {
    let mut heap = ReservedHeap::new(4096).unwrap();

    unsafe {
      let addr = heap.map(300_000).unwrap();
      assert_eq!(heap.live_mappings(), 1);

      addr.as_ptr().add(299_999).write(7);
      assert_eq!(*addr.as_ptr().add(299_999), 7);

      heap.unmap(addr, 300_000);
    }

    assert_eq!(heap.live_mappings(), 0);
  }
}
