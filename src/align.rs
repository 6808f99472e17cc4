/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` does not have to be a power of two, which matters for arenas
/// made of a block count like 3 or 5.
///
/// # Examples
///
/// ```rust
/// use rbuddy::align_to;
///
/// assert_eq!(align_to!(13usize, 16), 16);
/// assert_eq!(align_to!(32usize, 16), 32);
/// assert_eq!(align_to!(7usize, 3), 9);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $alignment:expr) => {
    ($value).div_ceil($alignment) * ($alignment)
  };
}

#[cfg(test)]
mod tests {
  const BLOCK: usize = 128 * 1024;

  #[test]
  fn test_align_to_block_boundaries() {
    for i in 0..10usize {
      let sizes = (BLOCK * i + 1)..=(BLOCK * (i + 1));

      for size in sizes.step_by(4093) {
        assert_eq!(BLOCK * (i + 1), align_to!(size, BLOCK));
      }
    }
  }

  #[test]
  fn test_align_to_keeps_aligned_values() {
    let arena = 32 * BLOCK;

    assert_eq!(0, align_to!(0usize, arena));
    assert_eq!(arena, align_to!(arena, arena));
    assert_eq!(3 * arena, align_to!(2 * arena + 1, arena));
  }
}
