use std::{
  cmp,
  ops::Range,
  ptr::{self, NonNull},
};

use log::{debug, trace, warn};

use crate::{
  align_to,
  block::{Block, HEADER_SIZE, MAPPED_ORDER},
  config::Config,
  error::{AllocError, Result},
  list::BlockList,
  order::{MAX_BLOCK_SIZE, MAX_ORDER, block_capacity, block_size, buddy_of, order_for},
  source::{MemorySource, SystemMemory},
  stats::Stats,
  table::SizeClassTable,
};

/// The heap span owned by an allocator once it has been bootstrapped.
#[derive(Debug, Clone, Copy)]
struct Arena {
  base: usize,
  len: usize,
}

/// Buddy-system allocator over an arena carved from a [`MemorySource`].
///
/// ```text
///   Arena (aligned to its own size):
///
///   ┌────────────┬────────────┬─────┬────────────┐
///   │  128 KiB   │  128 KiB   │ ... │  128 KiB   │   order 10 blocks
///   └────────────┴────────────┴─────┴────────────┘
///         │ split
///         ▼
///   ┌─────┬──┬─┬┐
///   │ 64K │32│…││                                    orders 9, 8, ...
///   └─────┴──┴─┴┘
/// ```
///
/// Requests larger than an order 10 block get their own anonymous mapping.
/// The allocator is single-threaded: wrap it in
/// [`LockedBuddy`](crate::LockedBuddy) to share it.
pub struct BuddyAllocator<S: MemorySource = SystemMemory> {
  source: S,
  config: Config,
  table: SizeClassTable,
  mapped: BlockList,
  arena: Option<Arena>,
  stats: Stats,
}

// SAFETY: every header reachable from the lists lives in memory owned
// exclusively by this allocator, so moving it to another thread moves that
// ownership with it.
unsafe impl<S: MemorySource + Send> Send for BuddyAllocator<S> {}

impl BuddyAllocator<SystemMemory> {
  /// An allocator on the process heap with the default [`Config`].
  pub const fn new() -> Self {
    Self::with_config(SystemMemory, Config::new())
  }
}

impl Default for BuddyAllocator<SystemMemory> {
  fn default() -> Self {
    Self::new()
  }
}

impl<S: MemorySource> BuddyAllocator<S> {
  /// Builds an allocator. No memory is touched until the first request.
  pub const fn with_config(
    source: S,
    config: Config,
  ) -> Self {
    Self {
      source,
      config,
      table: SizeClassTable::new(),
      mapped: BlockList::new(),
      arena: None,
      stats: Stats {
        free_blocks: 0,
        free_bytes: 0,
        allocated_blocks: 0,
        allocated_bytes: 0,
        metadata_bytes: 0,
      },
    }
  }

  pub fn with_source(source: S) -> Self {
    Self::with_config(source, Config::new())
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn table(&self) -> &SizeClassTable {
    &self.table
  }

  pub fn mapped(&self) -> &BlockList {
    &self.mapped
  }

  /// Address range of the arena, once it has been carved.
  pub fn arena(&self) -> Option<Range<usize>> {
    self.arena.map(|arena| arena.base..arena.base + arena.len)
  }

  /// Allocates `size` bytes, returning null on any failure.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    self.try_allocate(size).map_or(ptr::null_mut(), NonNull::as_ptr)
  }

  /// Allocates `count * elem_size` zeroed bytes, returning null on any
  /// failure.
  pub fn allocate_zeroed(
    &mut self,
    count: usize,
    elem_size: usize,
  ) -> *mut u8 {
    self
      .try_allocate_zeroed(count, elem_size)
      .map_or(ptr::null_mut(), NonNull::as_ptr)
  }

  /// Resizes the allocation at `ptr`, returning null on any failure. The
  /// old allocation stays valid when null is returned.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this allocator.
  pub unsafe fn resize(
    &mut self,
    ptr: *mut u8,
    new_size: usize,
  ) -> *mut u8 {
    unsafe { self.try_resize(ptr, new_size) }.map_or(ptr::null_mut(), NonNull::as_ptr)
  }

  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    self.check_size(size)?;
    self.bootstrap()?;

    let payload = match order_for(size) {
      Some(order) => self.allocate_in_arena(size, order)?,
      None => self.allocate_mapped(size)?,
    };

    self.refresh_stats();
    Ok(payload)
  }

  pub fn try_allocate_zeroed(
    &mut self,
    count: usize,
    elem_size: usize,
  ) -> Result<NonNull<u8>> {
    let size = count
      .checked_mul(elem_size)
      .ok_or(AllocError::SizeOverflow { count, elem_size })?;

    let payload = self.try_allocate(size)?;
    unsafe { payload.as_ptr().write_bytes(0, size) };

    Ok(payload)
  }

  /// Returns the block at `ptr` to the allocator.
  ///
  /// Null and already free pointers are ignored.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a pointer returned by this allocator.
  pub unsafe fn free(
    &mut self,
    ptr: *mut u8,
  ) {
    unsafe {
      if ptr.is_null() {
        return;
      }

      let block = Block::from_payload(ptr);

      if (*block).is_free {
        trace!("ignoring free of already free block {block:?}");
        return;
      }

      match (*block).heap_order() {
        Some(order) => self.free_in_arena(block, order),
        None => self.free_mapped(block),
      }
    }

    self.refresh_stats();
  }

  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this allocator.
  pub unsafe fn try_resize(
    &mut self,
    ptr: *mut u8,
    new_size: usize,
  ) -> Result<NonNull<u8>> {
    if ptr.is_null() {
      return self.try_allocate(new_size);
    }

    self.check_size(new_size)?;

    unsafe {
      let block = Block::from_payload(ptr);

      match (*block).heap_order() {
        Some(order) => self.resize_in_arena(ptr, block, order, new_size),
        None => self.resize_mapped(ptr, block, new_size),
      }
    }
  }

  pub fn stats(&self) -> Stats {
    self.stats
  }

  pub fn free_block_count(&self) -> usize {
    self.stats.free_blocks
  }

  pub fn free_byte_count(&self) -> usize {
    self.stats.free_bytes
  }

  pub fn allocated_block_count(&self) -> usize {
    self.stats.allocated_blocks
  }

  pub fn allocated_byte_count(&self) -> usize {
    self.stats.allocated_bytes
  }

  pub fn metadata_byte_count(&self) -> usize {
    self.stats.metadata_bytes
  }

  pub const fn header_size() -> usize {
    HEADER_SIZE
  }

  fn check_size(
    &self,
    size: usize,
  ) -> Result<()> {
    if size == 0 || size > self.config.max_request() {
      return Err(AllocError::InvalidSize(size));
    }

    Ok(())
  }

  fn refresh_stats(&mut self) {
    self.stats = Stats::collect(&self.table, &self.mapped);
  }

  /// Carves the arena on first use.
  ///
  /// The break is first pushed to the next multiple of the arena size, then
  /// one arena worth of bytes is taken, so every top-order block starts on
  /// a boundary of its own size.
  fn bootstrap(&mut self) -> Result<()> {
    if self.arena.is_some() {
      return Ok(());
    }

    let len = self.config.arena_size();
    let current = self.source.program_break()?;
    let padding = align_to!(current, len) - current;

    let grow = padding
      .checked_add(len)
      .ok_or(AllocError::SystemResource { call: "sbrk", errno: libc::ENOMEM })?;

    let old = unsafe { self.source.extend_break(grow)? };
    let old_addr = old.as_ptr() as usize;
    let base = align_to!(old_addr, len);

    // The `grow` bytes just taken stay behind the break and are lost: the
    // break belongs to whoever moved it, so it is not pulled back.
    if base - old_addr > padding {
      warn!("program break moved from {current:#x} to {old_addr:#x} during bootstrap");
      return Err(AllocError::SystemResource { call: "sbrk", errno: libc::EAGAIN });
    }

    unsafe {
      let start = old.as_ptr().add(base - old_addr);

      for i in 0..self.config.arena_blocks() {
        let block = carve(start.add(i * MAX_BLOCK_SIZE));
        self.table.push_free(block, MAX_ORDER);
      }
    }

    debug!(
      "arena of {} blocks at {base:#x}..{:#x} ({padding} bytes of padding)",
      self.config.arena_blocks(),
      base + len
    );

    self.arena = Some(Arena { base, len });
    self.refresh_stats();
    Ok(())
  }

  /// Takes the smallest free block of at least `order` and splits it down,
  /// returning every upper half to the free list one order below.
  fn allocate_in_arena(
    &mut self,
    size: usize,
    order: usize,
  ) -> Result<NonNull<u8>> {
    let (block, mut current) = self.table.suitable_free_block(size).ok_or_else(|| {
      debug!("no free block for {size} bytes (order {order})");
      AllocError::ArenaExhausted(size)
    })?;

    unsafe {
      self.table.remove_free(block, current);

      while current > order {
        current -= 1;

        let upper = carve((block as *mut u8).add(block_size(current)));
        trace!("split {block:?}: upper half {upper:?} to order {current}");
        self.table.push_free(upper, current);
      }

      self.table.push_allocated(block, order);
      Ok(NonNull::new_unchecked(Block::payload(block)))
    }
  }

  fn allocate_mapped(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let len = size.checked_add(HEADER_SIZE).ok_or(AllocError::InvalidSize(size))?;

    unsafe {
      let block = self.source.map(len)?.as_ptr() as *mut Block;

      block.write(Block::new(MAPPED_ORDER, size, false));
      self.mapped.insert(block);

      trace!("mapped {len} bytes at {block:?}");
      Ok(NonNull::new_unchecked(Block::payload(block)))
    }
  }

  unsafe fn free_in_arena(
    &mut self,
    block: *mut Block,
    order: usize,
  ) {
    unsafe {
      self.table.remove_allocated(block, order);

      let (base, order) = self.coalesce(block, order, MAX_ORDER);
      self.table.push_free(base, order);
    }
  }

  unsafe fn free_mapped(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      let len = (*block).size + HEADER_SIZE;

      self.mapped.remove(block);
      self.source.unmap(NonNull::new_unchecked(block as *mut u8), len);

      trace!("unmapped {len} bytes at {block:?}");
    }
  }

  /// Merges `block` with its free buddies while they match, up to `limit`.
  ///
  /// Every absorbed buddy is unlinked from its free list. Returns the base
  /// and order of the merged block, which is not linked anywhere.
  unsafe fn coalesce(
    &mut self,
    block: *mut Block,
    mut order: usize,
    limit: usize,
  ) -> (*mut Block, usize) {
    let mut base = block;

    unsafe {
      while order < limit {
        let buddy = base.map_addr(|addr| buddy_of(addr, order));

        if !is_free_at(buddy, order) {
          break;
        }

        self.table.remove_free(buddy, order);
        base = cmp::min(base, buddy);
        order += 1;

        trace!("merged into {base:?} at order {order}");
      }
    }

    (base, order)
  }

  /// Whether every buddy between `from` and `to` is free, so the block could
  /// grow in place.
  unsafe fn can_grow(
    &self,
    block: *mut Block,
    from: usize,
    to: usize,
  ) -> bool {
    let mut base = block;

    for order in from..to {
      let buddy = base.map_addr(|addr| buddy_of(addr, order));

      if !unsafe { is_free_at(buddy, order) } {
        return false;
      }

      base = cmp::min(base, buddy);
    }

    true
  }

  unsafe fn resize_in_arena(
    &mut self,
    ptr: *mut u8,
    block: *mut Block,
    order: usize,
    new_size: usize,
  ) -> Result<NonNull<u8>> {
    unsafe {
      let target = order_for(new_size);

      if let Some(target) = target {
        if target <= order {
          return Ok(NonNull::new_unchecked(ptr));
        }

        if self.can_grow(block, order, target) {
          return Ok(self.grow_in_place(ptr, block, order, target));
        }
      }

      let moved = self.try_allocate(new_size)?;
      ptr::copy_nonoverlapping(ptr, moved.as_ptr(), block_capacity(order));
      self.free(ptr);

      Ok(moved)
    }
  }

  /// Absorbs the free buddies up to `to` and slides the payload down to the
  /// merged block's base when it moved.
  unsafe fn grow_in_place(
    &mut self,
    ptr: *mut u8,
    block: *mut Block,
    from: usize,
    to: usize,
  ) -> NonNull<u8> {
    unsafe {
      self.table.remove_allocated(block, from);

      let (base, order) = self.coalesce(block, from, to);
      debug_assert_eq!(order, to, "buddy chain of {block:?} changed while growing");

      self.table.push_allocated(base, order);

      let payload = Block::payload(base);
      if payload != ptr {
        ptr::copy(ptr, payload, block_capacity(from));
      }

      trace!("grew {block:?} from order {from} to {order} at {base:?}");
      self.refresh_stats();

      NonNull::new_unchecked(payload)
    }
  }

  unsafe fn resize_mapped(
    &mut self,
    ptr: *mut u8,
    block: *mut Block,
    new_size: usize,
  ) -> Result<NonNull<u8>> {
    unsafe {
      let old_size = (*block).size;

      if old_size == new_size {
        return Ok(NonNull::new_unchecked(ptr));
      }

      let moved = self.allocate_mapped(new_size)?;
      ptr::copy_nonoverlapping(ptr, moved.as_ptr(), cmp::min(old_size, new_size));
      self.free_mapped(block);

      self.refresh_stats();
      Ok(moved)
    }
  }
}

/// Writes a blank header at `addr`.
unsafe fn carve(addr: *mut u8) -> *mut Block {
  let block = addr as *mut Block;
  unsafe { block.write(Block::new(0, 0, true)) };
  block
}

unsafe fn is_free_at(
  block: *mut Block,
  order: usize,
) -> bool {
  unsafe { (*block).is_free && (*block).order == order as i32 }
}
