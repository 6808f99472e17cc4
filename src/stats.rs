use std::fmt;

use crate::{block::HEADER_SIZE, list::BlockList, table::SizeClassTable};

/// Snapshot of the allocator's bookkeeping.
///
/// Derived data only: it is rebuilt from the block lists after every
/// mutating call and never patched incrementally.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
  /// Blocks sitting in a free list.
  pub free_blocks: usize,
  /// Payload bytes of the free blocks.
  pub free_bytes: usize,
  /// Arena blocks handed out plus mapped blocks.
  pub allocated_blocks: usize,
  /// Payload bytes of the allocated blocks.
  pub allocated_bytes: usize,
  /// Header bytes across every registered block.
  pub metadata_bytes: usize,
}

impl Stats {
  /// Rebuilds the snapshot by scanning every list.
  pub fn collect(
    table: &SizeClassTable,
    mapped: &BlockList,
  ) -> Self {
    let mut stats = Self::default();

    for order in table.orders() {
      let free = table.free(order);
      let allocated = table.allocated(order);

      stats.free_blocks += free.len();
      stats.free_bytes += free.bytes();
      stats.allocated_blocks += allocated.len();
      stats.allocated_bytes += allocated.bytes();
    }

    for block in mapped.iter() {
      stats.allocated_blocks += 1;
      stats.allocated_bytes += unsafe { (*block).size };
    }

    stats.metadata_bytes = stats.total_blocks() * HEADER_SIZE;
    stats
  }

  /// Every block known to the allocator, free or not.
  pub fn total_blocks(&self) -> usize {
    self.free_blocks + self.allocated_blocks
  }
}

impl fmt::Display for Stats {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(f, "Free blocks:      {}", self.free_blocks)?;
    writeln!(f, "Free bytes:       {}", self.free_bytes)?;
    writeln!(f, "Allocated blocks: {}", self.allocated_blocks)?;
    writeln!(f, "Allocated bytes:  {}", self.allocated_bytes)?;
    write!(f, "Metadata bytes:   {}", self.metadata_bytes)
  }
}
