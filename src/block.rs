use std::{mem, ptr};

use crate::order::{self, MAX_ORDER};

/// Order recorded in the header of a block that lives in its own mapping.
pub const MAPPED_ORDER: i32 = -1;

/// Alignment guaranteed for every payload handed out by the allocator.
pub const MIN_ALIGN: usize = 16;

/// Size of the [`Block`] header that precedes every payload.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

const _: () = assert!(HEADER_SIZE % MIN_ALIGN == 0);

/// Metadata written in place at the start of every managed block.
///
/// ```text
///   ┌──────────────────────────┬───────────────────────────────┐
///   │ size | next | prev       │                               │
///   │ order | is_free          │        payload                │
///   └──────────────────────────┴───────────────────────────────┘
///   ▲                          ▲
///   block base                 pointer returned to the user
/// ```
///
/// `next` and `prev` belong to whichever list currently owns the block.
#[repr(C, align(16))]
pub struct Block {
  /// Payload size, only meaningful for mapped blocks.
  pub size: usize,
  pub next: *mut Block,
  pub prev: *mut Block,
  /// `0..=MAX_ORDER` for arena blocks, [`MAPPED_ORDER`] for mapped ones.
  pub order: i32,
  pub is_free: bool,
}

impl Block {
  pub fn new(
    order: i32,
    size: usize,
    is_free: bool,
  ) -> Self {
    Self {
      size,
      next: ptr::null_mut(),
      prev: ptr::null_mut(),
      order,
      is_free,
    }
  }

  pub fn is_mapped(&self) -> bool {
    self.order == MAPPED_ORDER
  }

  /// The arena order of this block, `None` for mapped blocks.
  pub fn heap_order(&self) -> Option<usize> {
    usize::try_from(self.order).ok().filter(|&order| order <= MAX_ORDER)
  }

  /// Bytes usable by the caller.
  pub fn payload_size(&self) -> usize {
    match self.heap_order() {
      Some(order) => order::block_capacity(order),
      None => self.size,
    }
  }

  /// Recovers the header from a pointer previously returned to a caller.
  ///
  /// # Safety
  ///
  /// `payload` must point just past a live header.
  pub unsafe fn from_payload(payload: *mut u8) -> *mut Block {
    unsafe { payload.sub(HEADER_SIZE) as *mut Block }
  }

  /// The address handed out to callers for the block at `block`.
  ///
  /// # Safety
  ///
  /// `block` must point to a header followed by its payload.
  pub unsafe fn payload(block: *mut Block) -> *mut u8 {
    unsafe { (block as *mut u8).add(HEADER_SIZE) }
  }
}
