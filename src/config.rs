use std::num::NonZeroUsize;

use crate::{block::HEADER_SIZE, order::MAX_BLOCK_SIZE};

/// Number of top-order blocks carved out of the heap on first use.
pub const DEFAULT_ARENA_BLOCKS: NonZeroUsize = NonZeroUsize::new(32).unwrap();

/// Largest request accepted by [`BuddyAllocator`](crate::BuddyAllocator).
pub const DEFAULT_MAX_REQUEST: usize = 100_000_000;

/// Ceiling on [`Config::with_max_request`]: a request plus its header must
/// still fit in an `isize`.
pub const MAX_REQUEST_LIMIT: usize = isize::MAX as usize - HEADER_SIZE;

/// Ceiling on [`Config::with_arena_blocks`]: the arena plus up to one arena of
/// alignment padding must still fit in an `isize`.
pub const MAX_ARENA_BLOCKS: usize = (isize::MAX as usize / 2) / MAX_BLOCK_SIZE;

/// Tunables of a [`BuddyAllocator`](crate::BuddyAllocator).
///
/// ```rust
/// use std::num::NonZeroUsize;
/// use rbuddy::Config;
///
/// let config = Config::new()
///   .with_arena_blocks(NonZeroUsize::new(4).unwrap())
///   .with_max_request(1 << 20);
///
/// assert_eq!(config.arena_size(), 4 * 128 * 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  arena_blocks: NonZeroUsize,
  max_request: usize,
}

impl Config {
  pub const fn new() -> Self {
    Self {
      arena_blocks: DEFAULT_ARENA_BLOCKS,
      max_request: DEFAULT_MAX_REQUEST,
    }
  }

  /// Sets the arena block count, clamped to [`MAX_ARENA_BLOCKS`].
  pub const fn with_arena_blocks(
    mut self,
    arena_blocks: NonZeroUsize,
  ) -> Self {
    if arena_blocks.get() > MAX_ARENA_BLOCKS {
      self.arena_blocks = NonZeroUsize::new(MAX_ARENA_BLOCKS).unwrap();
    } else {
      self.arena_blocks = arena_blocks;
    }
    self
  }

  /// Sets the request ceiling, clamped to [`MAX_REQUEST_LIMIT`].
  pub const fn with_max_request(
    mut self,
    max_request: usize,
  ) -> Self {
    if max_request > MAX_REQUEST_LIMIT {
      self.max_request = MAX_REQUEST_LIMIT;
    } else {
      self.max_request = max_request;
    }
    self
  }

  pub const fn arena_blocks(&self) -> usize {
    self.arena_blocks.get()
  }

  pub const fn max_request(&self) -> usize {
    self.max_request
  }

  /// Bytes reserved for the arena, which is also its alignment.
  pub const fn arena_size(&self) -> usize {
    self.arena_blocks.get() * MAX_BLOCK_SIZE
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::new()
  }
}
