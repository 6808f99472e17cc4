use thiserror::Error;

/// Result of every fallible allocator operation.
pub type Result<T, E = AllocError> = std::result::Result<T, E>;

/// Reasons an allocation request can fail.
///
/// The pointer based API reports every one of them as a null pointer; the
/// `try_*` methods hand them out as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  /// Zero bytes, or more than the configured ceiling.
  #[error("invalid allocation size: {0} bytes")]
  InvalidSize(usize),
  /// `count * elem_size` of a zeroed allocation does not fit in a `usize`.
  #[error("allocation of {count} elements of {elem_size} bytes overflows")]
  SizeOverflow { count: usize, elem_size: usize },
  /// No free arena block is large enough and the request is too small to
  /// get its own mapping.
  #[error("arena exhausted: no free block can hold {0} bytes")]
  ArenaExhausted(usize),
  /// The program break could not be moved or a mapping could not be made.
  #[error("{call} failed (errno {errno})")]
  SystemResource { call: &'static str, errno: i32 },
}

impl AllocError {
  /// Builds a [`AllocError::SystemResource`] from the current `errno`.
  pub fn last_os_error(call: &'static str) -> Self {
    Self::SystemResource {
      call,
      errno: std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
    }
  }
}
