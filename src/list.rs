use std::{iter, ptr};

use crate::block::Block;

/// Doubly linked list of block headers, sorted by ascending address.
///
/// ```text
///   head
///    │
///    ▼
///   ┌──────┐ next ┌──────┐ next ┌──────┐
///   │ 0x.. │─────►│ 0x.. │─────►│ 0x.. │──► null
///   │      │◄─────│      │◄─────│      │
///   └──────┘ prev └──────┘ prev └──────┘
/// ```
///
/// The list does not own the memory of its blocks, it only threads the
/// `next`/`prev` links stored in their headers.
pub struct BlockList {
  head: *mut Block,
  num_blocks: usize,
  num_bytes: usize,
}

impl BlockList {
  pub const fn new() -> Self {
    Self {
      head: ptr::null_mut(),
      num_blocks: 0,
      num_bytes: 0,
    }
  }

  pub fn head(&self) -> *mut Block {
    self.head
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_null()
  }

  /// Number of blocks in the list.
  pub fn len(&self) -> usize {
    self.num_blocks
  }

  /// Sum of the payload sizes of every block in the list.
  pub fn bytes(&self) -> usize {
    self.num_bytes
  }

  /// Links `block` in front of the first block with a higher address.
  ///
  /// # Safety
  ///
  /// `block` must be a valid header that is not linked into any list.
  pub unsafe fn insert(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      if block.is_null() {
        return;
      }

      let mut prev: *mut Block = ptr::null_mut();
      let mut current = self.head;

      while !current.is_null() && current < block {
        prev = current;
        current = (*current).next;
      }

      (*block).prev = prev;
      (*block).next = current;

      if !current.is_null() {
        (*current).prev = block;
      }

      if prev.is_null() {
        self.head = block;
      } else {
        (*prev).next = block;
      }

      self.num_blocks += 1;
      self.num_bytes += (*block).payload_size();
    }
  }

  /// Unlinks `block` from the list.
  ///
  /// # Safety
  ///
  /// `block` must be null or a member of this list.
  pub unsafe fn remove(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      if block.is_null() {
        return;
      }

      let next = (*block).next;
      let prev = (*block).prev;

      if block == self.head {
        self.head = next;
      } else {
        (*prev).next = next;
      }

      if !next.is_null() {
        (*next).prev = prev;
      }

      (*block).next = ptr::null_mut();
      (*block).prev = ptr::null_mut();

      self.num_blocks -= 1;
      self.num_bytes -= (*block).payload_size();
    }
  }

  /// Walks the list from the lowest address upwards.
  pub fn iter(&self) -> impl Iterator<Item = *mut Block> + '_ {
    let mut current = self.head;

    iter::from_fn(move || {
      if current.is_null() {
        return None;
      }

      let block = current;
      current = unsafe { (*block).next };
      Some(block)
    })
  }
}

impl Default for BlockList {
  fn default() -> Self {
    Self::new()
  }
}
