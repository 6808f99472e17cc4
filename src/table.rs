use std::ops::Range;

use crate::{
  block::Block,
  list::BlockList,
  order::{ORDER_COUNT, order_for},
};

const EMPTY_LISTS: [BlockList; ORDER_COUNT] = [const { BlockList::new() }; ORDER_COUNT];

/// One free list and one allocated list per order.
///
/// ```text
///   order │ free            │ allocated
///   ──────┼─────────────────┼──────────────
///     0   │ ─► □ ─► □       │ ─► ■
///     1   │                 │
///    ...  │                 │
///    10   │ ─► □ ─► □ ─► □  │
/// ```
///
/// Moving a block between lists rewrites its header so that `order` and
/// `is_free` always describe the list it sits in.
pub struct SizeClassTable {
  free: [BlockList; ORDER_COUNT],
  allocated: [BlockList; ORDER_COUNT],
}

impl SizeClassTable {
  pub const fn new() -> Self {
    Self {
      free: EMPTY_LISTS,
      allocated: EMPTY_LISTS,
    }
  }

  pub fn orders(&self) -> Range<usize> {
    0..ORDER_COUNT
  }

  pub fn free(
    &self,
    order: usize,
  ) -> &BlockList {
    &self.free[order]
  }

  pub fn allocated(
    &self,
    order: usize,
  ) -> &BlockList {
    &self.allocated[order]
  }

  /// Marks `block` free at `order` and links it into that free list.
  ///
  /// # Safety
  ///
  /// `block` must be a writable header that is not linked into any list.
  pub unsafe fn push_free(
    &mut self,
    block: *mut Block,
    order: usize,
  ) {
    unsafe {
      (*block).order = order as i32;
      (*block).is_free = true;
      self.free[order].insert(block);
    }
  }

  /// Marks `block` allocated at `order` and links it into that list.
  ///
  /// # Safety
  ///
  /// `block` must be a writable header that is not linked into any list.
  pub unsafe fn push_allocated(
    &mut self,
    block: *mut Block,
    order: usize,
  ) {
    unsafe {
      (*block).order = order as i32;
      (*block).is_free = false;
      self.allocated[order].insert(block);
    }
  }

  /// # Safety
  ///
  /// `block` must be a member of the free list of `order`.
  pub unsafe fn remove_free(
    &mut self,
    block: *mut Block,
    order: usize,
  ) {
    unsafe { self.free[order].remove(block) }
  }

  /// # Safety
  ///
  /// `block` must be a member of the allocated list of `order`.
  pub unsafe fn remove_allocated(
    &mut self,
    block: *mut Block,
    order: usize,
  ) {
    unsafe { self.allocated[order].remove(block) }
  }

  /// The lowest addressed free block of the smallest order that can hold
  /// `size` bytes, with the order it was found at.
  ///
  /// Returns `None` when the request needs its own mapping or when every
  /// large enough free list is empty.
  pub fn suitable_free_block(
    &self,
    size: usize,
  ) -> Option<(*mut Block, usize)> {
    self.first_free_from(order_for(size)?)
  }

  /// Head of the first non-empty free list at or above `order`, with the
  /// order it was found at.
  pub fn first_free_from(
    &self,
    order: usize,
  ) -> Option<(*mut Block, usize)> {
    (order..ORDER_COUNT)
      .find(|&order| !self.free[order].is_empty())
      .map(|order| (self.free[order].head(), order))
  }
}

impl Default for SizeClassTable {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::order::{MAX_ORDER, block_capacity};

  #[test]
  fn test_push_rewrites_header() {
    let mut block = Block::new(7, 0, false);
    let mut table = SizeClassTable::new();

    unsafe { table.push_free(&mut block, 3) };
    assert_eq!(block.order, 3);
    assert!(block.is_free);
    assert_eq!(table.free(3).len(), 1);

    unsafe {
      table.remove_free(&mut block, 3);
      table.push_allocated(&mut block, 3);
    }
    assert!(!block.is_free);
    assert!(table.free(3).is_empty());
    assert_eq!(table.allocated(3).len(), 1);
  }

  #[test]
  fn test_suitable_free_block_prefers_smallest_order() {
    let mut small = Block::new(0, 0, true);
    let mut large = Block::new(0, 0, true);
    let mut table = SizeClassTable::new();

    unsafe {
      table.push_free(&mut large, MAX_ORDER);
      table.push_free(&mut small, 2);
    }

    let small_ptr: *mut Block = &mut small;
    let large_ptr: *mut Block = &mut large;

    assert_eq!(table.suitable_free_block(1), Some((small_ptr, 2)));
    assert_eq!(table.suitable_free_block(block_capacity(2)), Some((small_ptr, 2)));
    assert_eq!(
      table.suitable_free_block(block_capacity(2) + 1),
      Some((large_ptr, MAX_ORDER))
    );
    assert_eq!(table.suitable_free_block(block_capacity(MAX_ORDER) + 1), None);
  }

  #[test]
  fn test_suitable_free_block_on_empty_table() {
    assert_eq!(SizeClassTable::new().suitable_free_block(64), None);
  }
}
