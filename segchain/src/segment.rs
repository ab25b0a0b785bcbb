use core::{
  fmt,
  marker::PhantomData,
  mem,
  ops::Deref,
  ptr::{self, NonNull},
  slice,
};

use crossbeam_utils::Backoff;

use crate::{common::*, Allocator, Error, Lifetime, Pod};


/// A contiguous run of slots claimed inside a [`Segment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reservation {
  start: usize,
  len: usize,
}

impl Reservation {
  #[inline]
  pub(crate) const fn start(&self) -> usize {
    self.start
  }

  #[inline]
  pub(crate) const fn len(&self) -> usize {
    self.len
  }

  #[inline]
  pub(crate) const fn is_empty(&self) -> bool {
    self.len == 0
  }
}

/// A fixed-capacity slab of elements, one link of a [`Chain`](crate::Chain).
///
/// The payload buffer is allocated once when the segment is created and never
/// moves, so references into it stay valid for the lifetime of the chain.
pub struct Segment<T> {
  len: AtomicUsize,
  next: AtomicPtr<Segment<T>>,
  data: NonNull<T>,
  cap: usize,
}

unsafe impl<T: Pod> Send for Segment<T> {}
unsafe impl<T: Pod> Sync for Segment<T> {}

impl<T: Pod + fmt::Debug> fmt::Debug for Segment<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Segment")
      .field("cap", &self.cap)
      .field("len", &self.len())
      .field("data", &self.as_slice())
      .finish()
  }
}

impl<T: Pod> Segment<T> {
  #[inline]
  pub(crate) fn storage_layout(capacity: usize) -> Result<Layout, Error> {
    Layout::array::<T>(capacity).map_err(|_| Error::CapacityOverflow {
      capacity,
      elem_size: mem::size_of::<T>(),
    })
  }

  /// Allocates a new, empty segment.
  ///
  /// The payload buffer is zero-filled, so every slot holds a valid `T` even
  /// before it is written.
  pub(crate) fn create<A: Allocator>(
    capacity: usize,
    alloc: &A,
    lifetime: Lifetime,
  ) -> Result<NonNull<Self>, Error> {
    let storage = Self::storage_layout(capacity)?;
    let data = alloc.allocate(storage, lifetime)?;

    let header = Layout::new::<Self>();
    let ptr = match alloc.allocate(header, lifetime) {
      Ok(ptr) => ptr.cast::<Self>(),
      Err(e) => {
        // Safety: `data` was just allocated with the same layout and lifetime.
        unsafe { alloc.deallocate(data, storage, lifetime) };
        return Err(e);
      }
    };

    // Safety: both blocks are freshly allocated, well-aligned and large enough.
    unsafe {
      ptr::write_bytes(data.as_ptr(), 0, storage.size());
      ptr.as_ptr().write(Self {
        len: AtomicUsize::new(0),
        next: AtomicPtr::new(ptr::null_mut()),
        data: data.cast(),
        cap: capacity,
      });
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
      "allocate segment with capacity {} ({} bytes) at {:p}",
      capacity,
      storage.size(),
      ptr
    );

    Ok(ptr)
  }

  /// Releases `head` and every segment reachable from it.
  ///
  /// Returns the number of released segments.
  ///
  /// # Safety
  /// - `head` must have been created by [`Segment::create`] with the same allocator and lifetime.
  /// - No reference into any reachable segment may be used afterwards.
  pub(crate) unsafe fn dispose_all<A: Allocator>(
    head: NonNull<Self>,
    alloc: &A,
    lifetime: Lifetime,
  ) -> usize {
    let mut released = 0;
    let mut current = head.as_ptr();
    while let Some(seg) = NonNull::new(current) {
      // read the link before the header is released.
      current = seg.as_ref().next.load(Ordering::Acquire);
      Self::dispose(seg, alloc, lifetime);
      released += 1;
    }
    released
  }

  /// Releases the payload buffer and the header of a single segment.
  unsafe fn dispose<A: Allocator>(seg: NonNull<Self>, alloc: &A, lifetime: Lifetime) {
    let (data, cap) = {
      let s = seg.as_ref();
      (s.data, s.cap)
    };
    ptr::drop_in_place(seg.as_ptr());

    // the layout was validated when the segment was created.
    let storage = Layout::from_size_align_unchecked(mem::size_of::<T>() * cap, mem::align_of::<T>());
    alloc.deallocate(data.cast(), storage, lifetime);
    alloc.deallocate(seg.cast(), Layout::new::<Self>(), lifetime);
  }

  /// Returns the number of elements the segment can hold.
  #[inline]
  pub fn capacity(&self) -> usize {
    self.cap
  }

  /// Returns the number of occupied slots.
  #[inline]
  pub fn len(&self) -> usize {
    self.len.load(Ordering::Acquire)
  }

  /// Returns `true` if no slot is occupied.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns `true` if every slot is occupied.
  #[inline]
  pub fn is_full(&self) -> bool {
    self.len() == self.cap
  }

  /// Returns the next segment in the chain, if any.
  #[inline]
  pub fn next(&self) -> Option<&Segment<T>> {
    // Safety: a published link is never changed and the segment lives as long as the chain.
    unsafe { self.next.load(Ordering::Acquire).as_ref() }
  }

  #[inline]
  pub(crate) fn next_link(&self) -> &AtomicPtr<Segment<T>> {
    &self.next
  }

  /// Claims up to `n` contiguous slots.
  ///
  /// Returns an empty reservation when the segment is full. The claimed slots
  /// belong to the caller until they are written.
  pub(crate) fn try_reserve(&self, n: usize) -> Reservation {
    let mut len = self.len.load(Ordering::Acquire);
    if n == 0 {
      return Reservation { start: len, len: 0 };
    }

    let backoff = Backoff::new();
    loop {
      let want = n.min(self.cap - len);
      if want == 0 {
        return Reservation { start: len, len: 0 };
      }

      match self.len.compare_exchange_weak(
        len,
        len + want,
        Ordering::AcqRel,
        Ordering::Acquire,
      ) {
        Ok(start) => return Reservation { start, len: want },
        Err(current) => {
          len = current;
          backoff.spin();
        }
      }
    }
  }

  /// Claims a single slot, returning its index.
  #[inline]
  pub(crate) fn try_reserve_one(&self) -> Option<usize> {
    let r = self.try_reserve(1);
    (!r.is_empty()).then_some(r.start)
  }

  /// ## Safety
  /// - `index` must belong to a reservation owned by the caller and not yet written.
  #[inline]
  pub(crate) unsafe fn write(&self, index: usize, val: T) {
    debug_assert!(index < self.cap);
    self.data.as_ptr().add(index).write(val);
  }

  /// ## Safety
  /// - `[start, start + src.len())` must belong to a reservation owned by the caller.
  #[inline]
  pub(crate) unsafe fn write_slice(&self, start: usize, src: &[T]) {
    debug_assert!(start + src.len() <= self.cap);
    ptr::copy_nonoverlapping(src.as_ptr(), self.data.as_ptr().add(start), src.len());
  }

  /// Fills an unpublished segment with the first `capacity` elements of `src`.
  ///
  /// Returns the number of elements written.
  ///
  /// ## Safety
  /// - The segment must be empty and not yet reachable by other threads.
  pub(crate) unsafe fn fill_unpublished(&self, src: &[T]) -> usize {
    let n = src.len().min(self.cap);
    self.write_slice(0, &src[..n]);
    self.len.store(n, Ordering::Relaxed);
    n
  }

  /// Returns the element at `index`, or `None` if the slot is not occupied.
  #[inline]
  pub fn get(&self, index: usize) -> Option<&T> {
    self.as_slice().get(index)
  }

  /// Returns a mutable reference to the element at `index`, or `None` if the slot is not occupied.
  #[inline]
  pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
    self.as_mut_slice().get_mut(index)
  }

  /// Returns the occupied slots as a slice.
  #[inline]
  pub fn as_slice(&self) -> &[T] {
    // Safety: the buffer is initialized (zeroed on creation) and `len <= cap`.
    unsafe { slice::from_raw_parts(self.data.as_ptr(), self.len()) }
  }

  /// Returns the occupied slots as a mutable slice.
  #[inline]
  pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
    // Safety: the buffer is initialized (zeroed on creation) and `len <= cap`.
    unsafe { slice::from_raw_parts_mut(self.data.as_ptr(), self.len()) }
  }

  /// Returns `true` if the segment holds an element equal to `val`.
  #[inline]
  pub fn contains(&self, val: &T) -> bool
  where
    T: PartialEq,
  {
    self.as_slice().contains(val)
  }

  /// Removes the first element equal to `val`, filling the hole with the last element.
  ///
  /// Returns `true` if an element was removed.
  pub(crate) fn remove(&mut self, val: &T) -> bool
  where
    T: PartialEq,
  {
    match self.as_slice().iter().position(|x| x == val) {
      Some(idx) => self.remove_swap_back(idx).is_ok(),
      None => false,
    }
  }

  /// Removes the element at `index`, moving the last element into its slot.
  ///
  /// This does not preserve ordering, but is O(1).
  pub(crate) fn remove_swap_back(&mut self, index: usize) -> Result<T, Error> {
    let len = self.len();
    if index >= len {
      return Err(Error::out_of_bounds(index, len));
    }

    let last = len - 1;
    let slots = self.as_mut_slice();
    let removed = slots[index];
    slots[index] = slots[last];
    self.len.store(last, Ordering::Release);
    Ok(removed)
  }

  /// Resets the occupancy to zero.
  ///
  /// Stale elements stay in the buffer until they are overwritten.
  #[inline]
  pub(crate) fn clear(&mut self) {
    self.len.store(0, Ordering::Release);
  }
}

/// Exclusive access to the elements of one [`Segment`] of a [`Chain`](crate::Chain).
///
/// Yielded by [`Chain::segments_mut`](crate::Chain::segments_mut). The handle
/// reads through to the segment, but the segment itself can never be moved or
/// replaced, it stays owned by its chain:
///
/// ```compile_fail
/// use segchain::Chain;
///
/// let mut a = Chain::<u32>::new(4).unwrap();
/// let mut b = Chain::<u32>::new(1024).unwrap();
/// let mut x = a.segments_mut().next().unwrap();
/// let mut y = b.segments_mut().next().unwrap();
/// core::mem::swap(&mut *x, &mut *y);
/// ```
pub struct SegmentMut<'a, T> {
  seg: NonNull<Segment<T>>,
  hint: &'a AtomicPtr<Segment<T>>,
  _marker: PhantomData<&'a mut Segment<T>>,
}

unsafe impl<T: Pod> Send for SegmentMut<'_, T> {}
unsafe impl<T: Pod> Sync for SegmentMut<'_, T> {}

impl<'a, T: Pod> SegmentMut<'a, T> {
  /// ## Safety
  /// - `seg` must be a live segment of the chain owning `hint`, mutably borrowed for `'a`.
  /// - No other reference to `seg` may exist while the handle is alive.
  #[inline]
  pub(crate) unsafe fn new(seg: NonNull<Segment<T>>, hint: &'a AtomicPtr<Segment<T>>) -> Self {
    Self {
      seg,
      hint,
      _marker: PhantomData,
    }
  }

  #[inline]
  fn segment_mut(&mut self) -> &mut Segment<T> {
    // Safety: the handle has exclusive access to the segment.
    unsafe { self.seg.as_mut() }
  }

  /// Slots freed in this segment must be visible to appends again.
  #[inline]
  fn forget_hint(&self) {
    self.hint.store(ptr::null_mut(), Ordering::Release);
  }

  /// Returns a mutable reference to the element at `index`, or `None` if the slot is not occupied.
  #[inline]
  pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
    self.segment_mut().get_mut(index)
  }

  /// Returns the occupied slots as a mutable slice.
  #[inline]
  pub fn as_mut_slice(&mut self) -> &mut [T] {
    self.segment_mut().as_mut_slice()
  }

  /// Converts the handle into a mutable slice over the occupied slots.
  #[inline]
  pub fn into_mut_slice(self) -> &'a mut [T] {
    // Safety: the handle had exclusive access to the segment for 'a.
    unsafe { (*self.seg.as_ptr()).as_mut_slice() }
  }

  /// Removes the first element equal to `val`, filling the hole with the last element.
  ///
  /// Returns `true` if an element was removed.
  pub fn remove(&mut self, val: &T) -> bool
  where
    T: PartialEq,
  {
    let removed = self.segment_mut().remove(val);
    if removed {
      self.forget_hint();
    }
    removed
  }

  /// Removes the element at `index`, moving the last element into its slot.
  pub fn remove_swap_back(&mut self, index: usize) -> Result<T, Error> {
    let removed = self.segment_mut().remove_swap_back(index)?;
    self.forget_hint();
    Ok(removed)
  }

  /// Resets the occupancy to zero.
  ///
  /// Stale elements stay in the buffer until they are overwritten.
  #[inline]
  pub fn clear(&mut self) {
    self.segment_mut().clear();
    self.forget_hint();
  }
}

impl<T: Pod> Deref for SegmentMut<'_, T> {
  type Target = Segment<T>;

  #[inline]
  fn deref(&self) -> &Segment<T> {
    // Safety: the segment is live for as long as the handle.
    unsafe { self.seg.as_ref() }
  }
}

impl<T: Pod + fmt::Debug> fmt::Debug for SegmentMut<'_, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(&**self, f)
  }
}
