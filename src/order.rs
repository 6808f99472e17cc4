//! Size classes of the buddy arena.
//!
//! ```text
//!   order   block size   capacity (block size - header)
//!   ─────   ──────────   ──────────────────────────────
//!     0       128 B          96 B
//!     1       256 B         224 B
//!     2       512 B         480 B
//!    ...       ...           ...
//!    10      128 KiB     131040 B
//! ```

use crate::block::HEADER_SIZE;

/// Highest order (inclusive). Blocks of this order are never merged further.
pub const MAX_ORDER: usize = 10;

/// Number of size classes.
pub const ORDER_COUNT: usize = MAX_ORDER + 1;

/// Size of an order 0 block, header included.
pub const MIN_BLOCK_SIZE: usize = 128;

/// Size of an order [`MAX_ORDER`] block, header included.
pub const MAX_BLOCK_SIZE: usize = MIN_BLOCK_SIZE << MAX_ORDER;

/// Size in bytes of a block of the given order, header included.
pub const fn block_size(order: usize) -> usize {
  MIN_BLOCK_SIZE << order
}

/// Bytes a caller can use inside a block of the given order.
pub const fn block_capacity(order: usize) -> usize {
  block_size(order) - HEADER_SIZE
}

/// The smallest order whose capacity holds `size` bytes.
///
/// Returns `None` when no arena block is large enough, which routes the
/// request to a dedicated mapping.
pub fn order_for(size: usize) -> Option<usize> {
  (0..ORDER_COUNT).find(|&order| block_capacity(order) >= size)
}

/// Address of the buddy of the order `order` block starting at `addr`.
pub const fn buddy_of(
  addr: usize,
  order: usize,
) -> usize {
  addr ^ block_size(order)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_block_sizes() {
    assert_eq!(block_size(0), 128);
    assert_eq!(block_size(MAX_ORDER), 128 * 1024);
    assert_eq!(MAX_BLOCK_SIZE, 128 * 1024);
    assert_eq!(block_capacity(1), 256 - HEADER_SIZE);
  }

  #[test]
  fn test_order_for_boundaries() {
    assert_eq!(order_for(1), Some(0));
    assert_eq!(order_for(block_capacity(0)), Some(0));
    assert_eq!(order_for(block_capacity(0) + 1), Some(1));
    assert_eq!(order_for(200), Some(1));
    assert_eq!(order_for(block_capacity(MAX_ORDER)), Some(MAX_ORDER));
    assert_eq!(order_for(block_capacity(MAX_ORDER) + 1), None);
    assert_eq!(order_for(300_000), None);
  }

  #[test]
  fn test_order_for_is_monotone_and_minimal() {
    let mut previous = 0;

    for size in (1..=block_capacity(MAX_ORDER)).step_by(97) {
      let order = order_for(size).unwrap();

      assert!(order >= previous);
      assert!(block_capacity(order) >= size);
      if order > 0 {
        assert!(block_capacity(order - 1) < size);
      }

      previous = order;
    }
  }

  #[test]
  fn test_buddy_of() {
    let base = 32 * MAX_BLOCK_SIZE;

    assert_eq!(buddy_of(base, 0), base + 128);
    assert_eq!(buddy_of(base + 128, 0), base);
    assert_eq!(buddy_of(base + 512, 2), base);
    assert_eq!(buddy_of(base, MAX_ORDER), base + MAX_BLOCK_SIZE);
  }
}
