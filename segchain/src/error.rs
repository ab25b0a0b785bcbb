/// Errors returned by [`Chain`](crate::Chain) and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum Error {
  /// The allocator could not satisfy a request.
  AllocationFailed {
    /// The requested size in bytes
    size: usize,
    /// The requested alignment
    align: usize,
  },

  /// Index is out of range
  OutOfBounds {
    /// The requested index
    index: usize,
    /// The number of elements currently stored
    len: usize,
  },

  /// The chain owns no segment, it was either disposed or never built.
  Uninitialized,

  /// A segment must be able to hold at least one element.
  ZeroCapacity,

  /// The payload buffer of a single segment does not fit in `isize::MAX` bytes.
  CapacityOverflow {
    /// The requested number of elements per segment
    capacity: usize,
    /// The size of one element in bytes
    elem_size: usize,
  },
}

impl Error {
  #[inline]
  pub(crate) const fn allocation_failed(layout: core::alloc::Layout) -> Self {
    Self::AllocationFailed {
      size: layout.size(),
      align: layout.align(),
    }
  }

  #[inline]
  pub(crate) const fn out_of_bounds(index: usize, len: usize) -> Self {
    Self::OutOfBounds { index, len }
  }
}

impl core::fmt::Display for Error {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      Self::AllocationFailed { size, align } => write!(
        f,
        "Allocation failed: cannot allocate {} bytes with alignment {}",
        size, align
      ),
      Self::OutOfBounds { index, len } => write!(
        f,
        "Index out of bounds: index {} is out of range, the current length is {}",
        index, len
      ),
      Self::Uninitialized => write!(f, "Chain is uninitialized or has been disposed"),
      Self::ZeroCapacity => write!(f, "Segment capacity must be greater than zero"),
      Self::CapacityOverflow {
        capacity,
        elem_size,
      } => write!(
        f,
        "Capacity overflow: {} elements of {} bytes cannot fit in a single segment",
        capacity, elem_size
      ),
    }
  }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
