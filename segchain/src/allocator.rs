use core::ptr::NonNull;

use crate::{
  common::{alloc, dealloc, Layout},
  Error,
};

/// Tag describing how long an allocation is expected to live.
///
/// The tag is handed to [`Allocator::allocate`] and passed back, unchanged, to
/// [`Allocator::deallocate`]. The chain never interprets it, allocators may
/// use it to route requests to different pools.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
  /// Released within the current unit of work.
  Transient,
  /// Released when the owning scope (e.g. a batch of parallel work) ends.
  Scoped,
  /// Lives until it is explicitly released.
  #[default]
  Persistent,
  /// An allocator-defined tag.
  Custom(u16),
}

/// The memory provider of a [`Chain`](crate::Chain).
///
/// Every segment performs two allocations: one for its header and one for its
/// payload buffer. Both are released through [`deallocate`](Allocator::deallocate)
/// exactly once, when the chain is disposed.
pub trait Allocator {
  /// Allocates a block of memory described by `layout`.
  ///
  /// The returned block must stay valid, and must not move, until it is passed
  /// to [`deallocate`](Allocator::deallocate). `layout.size()` may be zero.
  fn allocate(&self, layout: Layout, lifetime: Lifetime) -> Result<NonNull<u8>, Error>;

  /// Releases a block of memory.
  ///
  /// # Safety
  /// - `ptr` must have been returned by [`allocate`](Allocator::allocate) on this allocator
  ///   with the same `layout` and `lifetime`.
  /// - `ptr` must not be released twice.
  unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout, lifetime: Lifetime);
}

impl<A: Allocator + ?Sized> Allocator for &A {
  #[inline]
  fn allocate(&self, layout: Layout, lifetime: Lifetime) -> Result<NonNull<u8>, Error> {
    (**self).allocate(layout, lifetime)
  }

  #[inline]
  unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout, lifetime: Lifetime) {
    (**self).deallocate(ptr, layout, lifetime)
  }
}

/// The global memory allocator.
///
/// Lifetime tags are ignored.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Global;

impl Allocator for Global {
  #[inline]
  fn allocate(&self, layout: Layout, _lifetime: Lifetime) -> Result<NonNull<u8>, Error> {
    if layout.size() == 0 {
      return Ok(dangling(layout));
    }

    // Safety: the layout has a non-zero size.
    let ptr = unsafe { alloc(layout) };
    NonNull::new(ptr).ok_or(Error::allocation_failed(layout))
  }

  #[inline]
  unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout, _lifetime: Lifetime) {
    if layout.size() != 0 {
      dealloc(ptr.as_ptr(), layout);
    }
  }
}

/// A well-aligned, non-null pointer for zero-sized blocks.
#[inline]
fn dangling(layout: Layout) -> NonNull<u8> {
  // Safety: alignment is always non-zero.
  unsafe { NonNull::new_unchecked(layout.align() as *mut u8) }
}
