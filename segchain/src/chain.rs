use core::{
  fmt,
  marker::PhantomData,
  ptr::{self, NonNull},
};

use crossbeam_utils::CachePadded;

use crate::{
  common::*,
  iter::{Iter, IterMut, Segments, SegmentsMut},
  Allocator, ChainOptions, Error, Global, Lifetime, Pod, Segment,
};

use std::vec::Vec;

#[cfg(test)]
mod tests;

/// Lock-free, append-only chain of fixed-capacity segments.
///
/// A chain is filled in two phases:
///
/// 1. **Produce**: [`Chain::writer`] hands out a [`Writer`], which is `Copy`, `Send` and `Sync`.
///    Any number of threads may append through it at the same time, nobody blocks.
/// 2. **Consume**: once every writer is gone, the chain can be read, searched,
///    cleared and modified sequentially.
///
/// A live [`Writer`] keeps the chain mutably borrowed, so the phases cannot overlap.
///
/// # Example
///
/// ```
/// use segchain::Chain;
///
/// let mut chain = Chain::<u32>::new(4).unwrap();
///
/// let writer = chain.writer();
/// std::thread::scope(|s| {
///   for i in 0..8 {
///     s.spawn(move || writer.add_concurrent(i).unwrap());
///   }
/// });
///
/// assert_eq!(chain.len(), 8);
/// let mut values = chain.to_vec();
/// values.sort();
/// assert_eq!(values, (0..8).collect::<Vec<_>>());
/// ```
pub struct Chain<T: Pod, A: Allocator = Global> {
  head: Option<NonNull<Segment<T>>>,
  /// A segment which was observed full. Only used to skip full segments
  /// when appending, it may lag behind the tail.
  hint: CachePadded<AtomicPtr<Segment<T>>>,
  cap: usize,
  lifetime: Lifetime,
  alloc: A,
  _marker: PhantomData<Segment<T>>,
}

unsafe impl<T: Pod, A: Allocator + Send> Send for Chain<T, A> {}
unsafe impl<T: Pod, A: Allocator + Sync> Sync for Chain<T, A> {}

impl<T: Pod + fmt::Debug, A: Allocator> fmt::Debug for Chain<T, A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.iter()).finish()
  }
}

impl<T: Pod, A: Allocator + Default> Default for Chain<T, A> {
  /// Creates a chain without any segment.
  ///
  /// Appends fail with [`Error::Uninitialized`] and reads see an empty chain.
  #[inline]
  fn default() -> Self {
    let opts = ChainOptions::new();
    Self::uninit(opts.capacity(), opts.lifetime(), A::default())
  }
}

impl<T: Pod, A: Allocator> Drop for Chain<T, A> {
  fn drop(&mut self) {
    self.dispose();
  }
}

impl<T: Pod> Chain<T> {
  /// Creates a chain with `capacity` elements per segment, backed by the [`Global`] allocator.
  #[inline]
  pub fn new(capacity: usize) -> Result<Self, Error> {
    Self::new_in(capacity, Global)
  }
}

impl<T: Pod, A: Allocator> Chain<T, A> {
  /// Creates a chain with `capacity` elements per segment, backed by `alloc`.
  ///
  /// Returns [`Error::ZeroCapacity`] if `capacity` is zero.
  #[inline]
  pub fn new_in(capacity: usize, alloc: A) -> Result<Self, Error> {
    if capacity == 0 {
      return Err(Error::ZeroCapacity);
    }
    Self::with_options_in(ChainOptions::new().with_capacity(capacity), alloc)
  }

  /// Creates a chain from [`ChainOptions`], backed by `alloc`.
  ///
  /// The first segment is allocated eagerly.
  pub fn with_options_in(opts: ChainOptions, alloc: A) -> Result<Self, Error> {
    let mut this = Self::uninit(opts.capacity(), opts.lifetime(), alloc);
    this.head = Some(Segment::create(this.cap, &this.alloc, this.lifetime)?);
    Ok(this)
  }

  #[inline]
  fn uninit(cap: usize, lifetime: Lifetime, alloc: A) -> Self {
    Self {
      head: None,
      hint: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
      cap,
      lifetime,
      alloc,
      _marker: PhantomData,
    }
  }

  /// Returns a handle for appending to the chain from many threads at once.
  ///
  /// # Example
  ///
  /// ```
  /// use segchain::Chain;
  ///
  /// let mut chain = Chain::<u64>::new(16).unwrap();
  /// let writer = chain.writer();
  /// std::thread::scope(|s| {
  ///   s.spawn(move || writer.add_range_concurrent(&[1, 2, 3]).unwrap());
  ///   s.spawn(move || writer.add_concurrent(4).unwrap());
  /// });
  /// assert_eq!(chain.len(), 4);
  /// ```
  #[inline]
  pub fn writer(&mut self) -> Writer<'_, T, A> {
    Writer { chain: self }
  }

  /// Appends an element.
  #[inline]
  pub fn push(&mut self, val: T) -> Result<(), Error> {
    self.add_concurrent(val)
  }

  /// Appends every element of `vals`, in order.
  #[inline]
  pub fn extend_from_slice(&mut self, vals: &[T]) -> Result<(), Error> {
    self.add_range_concurrent(vals)
  }

  /// Returns the number of elements each segment can hold.
  #[inline]
  pub fn capacity_per_segment(&self) -> usize {
    self.cap
  }

  /// Returns the lifetime tag used for every allocation.
  #[inline]
  pub fn lifetime(&self) -> Lifetime {
    self.lifetime
  }

  /// Returns a reference to the underlying allocator.
  #[inline]
  pub fn allocator(&self) -> &A {
    &self.alloc
  }

  /// Returns `true` if the chain owns at least one segment.
  #[inline]
  pub fn is_initialized(&self) -> bool {
    self.head.is_some()
  }

  /// Returns the total number of elements.
  #[inline]
  pub fn len(&self) -> usize {
    self.segments().map(Segment::len).sum()
  }

  /// Returns `true` if the chain holds no element.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.segments().all(Segment::is_empty)
  }

  /// Returns the number of segments.
  #[inline]
  pub fn segment_count(&self) -> usize {
    self.segments().count()
  }

  /// Returns the first segment.
  #[inline]
  pub fn head(&self) -> Option<&Segment<T>> {
    // Safety: the head lives as long as the chain.
    self.head.map(|h| unsafe { &*h.as_ptr() })
  }

  /// Returns an iterator over the segments, starting at the head.
  #[inline]
  pub fn segments(&self) -> Segments<'_, T> {
    Segments::new(self.head())
  }

  /// Returns an iterator over the segments which allows modifying their elements.
  #[inline]
  pub fn segments_mut(&mut self) -> SegmentsMut<'_, T> {
    // Safety: `self` is mutably borrowed for as long as the iterator lives.
    unsafe { SegmentsMut::new(self.head, &self.hint) }
  }

  /// Returns an iterator over the elements.
  #[inline]
  pub fn iter(&self) -> Iter<'_, T> {
    Iter::new(self.segments())
  }

  /// Returns an iterator which allows modifying each element.
  #[inline]
  pub fn iter_mut(&mut self) -> IterMut<'_, T> {
    IterMut::new(self.segments_mut())
  }

  /// Returns the element at the flat `index`.
  ///
  /// # Example
  ///
  /// ```
  /// use segchain::Chain;
  ///
  /// let mut chain = Chain::<i32>::new(4).unwrap();
  /// chain.extend_from_slice(&[1, 2, 3, 4, 5, 6]).unwrap();
  /// assert_eq!(chain.get(4), Ok(&5));
  /// assert!(chain.get(6).is_err());
  /// ```
  pub fn get(&self, index: usize) -> Result<&T, Error> {
    let head = self.head().ok_or(Error::Uninitialized)?;
    let (seg, local) = Self::locate(Segments::new(Some(head)), index)?;
    Ok(&seg.as_slice()[local])
  }

  /// Returns a mutable reference to the element at the flat `index`.
  pub fn get_mut(&mut self, index: usize) -> Result<&mut T, Error> {
    if self.head.is_none() {
      return Err(Error::Uninitialized);
    }
    let (seg, local) = Self::locate(self.segments_mut(), index)?;
    Ok(&mut seg.into_mut_slice()[local])
  }

  /// Removes the element at the flat `index`, moving the last element of
  /// the same segment into its slot.
  pub fn swap_remove(&mut self, index: usize) -> Result<T, Error> {
    if self.head.is_none() {
      return Err(Error::Uninitialized);
    }
    let (mut seg, local) = Self::locate(self.segments_mut(), index)?;
    seg.remove_swap_back(local)
  }

  /// Resolves a flat index to a segment and an index inside it.
  fn locate<S>(segments: impl Iterator<Item = S>, index: usize) -> Result<(S, usize), Error>
  where
    S: core::ops::Deref<Target = Segment<T>>,
  {
    let mut remaining = index;
    let mut total = 0;
    for seg in segments {
      let len = seg.len();
      if remaining < len {
        return Ok((seg, remaining));
      }
      remaining -= len;
      total += len;
    }
    Err(Error::out_of_bounds(index, total))
  }

  /// Returns `true` if the chain holds an element equal to `val`.
  #[inline]
  pub fn contains(&self, val: &T) -> bool
  where
    T: PartialEq,
  {
    self.segments().any(|seg| seg.contains(val))
  }

  /// Removes the first element equal to `val`.
  ///
  /// The hole is filled with the last element of the same segment.
  /// Returns `true` if an element was removed.
  pub fn remove(&mut self, val: &T) -> bool
  where
    T: PartialEq,
  {
    self.segments_mut().any(|mut seg| seg.remove(val))
  }

  /// Resets every segment to empty.
  ///
  /// Segments are kept and reused by subsequent appends.
  pub fn clear(&mut self) {
    self.segments_mut().for_each(|mut seg| seg.clear());
    self.reset_hint();
  }

  /// Copies elements into `dst`, in traversal order, until either `dst` is
  /// full or the chain is exhausted.
  ///
  /// Returns the number of copied elements.
  pub fn copy_to(&self, dst: &mut [T]) -> usize {
    let mut copied = 0;
    for seg in self.segments() {
      if copied == dst.len() {
        break;
      }
      let src = seg.as_slice();
      let n = src.len().min(dst.len() - copied);
      dst[copied..copied + n].copy_from_slice(&src[..n]);
      copied += n;
    }
    copied
  }

  /// Copies every element into a new `Vec`, in traversal order.
  pub fn to_vec(&self) -> Vec<T> {
    let mut out = Vec::with_capacity(self.len());
    for seg in self.segments() {
      out.extend_from_slice(seg.as_slice());
    }
    out
  }

  /// Releases every segment back to the allocator.
  ///
  /// The chain is left uninitialized: appends fail with [`Error::Uninitialized`],
  /// reads see an empty chain. Calling it again is a no-op.
  pub fn dispose(&mut self) {
    self.reset_hint();
    if let Some(head) = self.head.take() {
      // Safety: we have exclusive access, and the head can no longer be reached.
      let _released = unsafe { Segment::dispose_all(head, &self.alloc, self.lifetime) };

      #[cfg(feature = "tracing")]
      tracing::debug!("dispose chain, released {} segments", _released);
    }
  }

  #[inline]
  fn reset_hint(&self) {
    self.hint.store(ptr::null_mut(), Ordering::Release);
  }

  /// The segment appends start from, and the hint it was read from.
  #[inline]
  fn start(&self) -> Result<(&Segment<T>, *mut Segment<T>), Error> {
    let hint = self.hint.load(Ordering::Acquire);
    // Safety: hinted segments are reachable from the head, so they live as long as the chain.
    match unsafe { hint.as_ref() } {
      Some(seg) => Ok((seg, hint)),
      None => self.head().ok_or(Error::Uninitialized).map(|seg| (seg, hint)),
    }
  }

  /// Moves the hint from `observed` to the full segment `seg`.
  ///
  /// `observed` is the hint this writer last read or stored. If another writer
  /// moved the hint since, it is left alone, so the hint never goes backwards.
  #[inline]
  fn mark_full(&self, observed: &mut *mut Segment<T>, seg: &Segment<T>) {
    let full = seg as *const Segment<T> as *mut Segment<T>;
    if *observed == full {
      return;
    }
    if self
      .hint
      .compare_exchange(*observed, full, Ordering::Release, Ordering::Relaxed)
      .is_ok()
    {
      *observed = full;
    }
  }

  fn add_concurrent(&self, val: T) -> Result<(), Error> {
    let (mut current, mut observed) = self.start()?;
    loop {
      if let Some(idx) = current.try_reserve_one() {
        // Safety: the slot was reserved by us.
        unsafe { current.write(idx, val) };
        return Ok(());
      }

      self.mark_full(&mut observed, current);
      match current.next() {
        Some(next) => current = next,
        None => {
          self.publish(current, &[val])?;
          return Ok(());
        }
      }
    }
  }

  fn add_range_concurrent(&self, vals: &[T]) -> Result<(), Error> {
    let (mut current, mut observed) = self.start()?;
    let mut remaining = vals;
    while !remaining.is_empty() {
      let reserved = current.try_reserve(remaining.len());
      if !reserved.is_empty() {
        let (run, rest) = remaining.split_at(reserved.len());
        // Safety: the range was reserved by us.
        unsafe { current.write_slice(reserved.start(), run) };
        remaining = rest;
        if remaining.is_empty() {
          break;
        }
      }

      // a short reservation means the segment is full now.
      self.mark_full(&mut observed, current);
      match current.next() {
        Some(next) => current = next,
        None => {
          let (seg, written) = self.publish(current, remaining)?;
          remaining = &remaining[written..];
          current = seg;
        }
      }
    }
    Ok(())
  }

  /// Extends the chain with a new segment pre-filled with the head of `pending`.
  ///
  /// The new segment is linked after `tail`. When another thread wins the race
  /// for that link, the new segment is linked after the winner instead,
  /// walking forward until a free link is found.
  ///
  /// Returns the new segment and the number of elements written into it.
  fn publish<'a>(&'a self, tail: &'a Segment<T>, pending: &[T]) -> Result<(&'a Segment<T>, usize), Error> {
    let new = match Segment::create(self.cap, &self.alloc, self.lifetime) {
      Ok(seg) => seg,
      Err(e) => {
        #[cfg(feature = "tracing")]
        tracing::warn!("failed to extend chain: {}", e);
        return Err(e);
      }
    };

    // Safety: the segment is not reachable by any other thread yet.
    let written = unsafe { new.as_ref().fill_unpublished(pending) };

    let mut tail = tail;
    let mut _hops = 0usize;
    loop {
      match tail.next_link().compare_exchange(
        ptr::null_mut(),
        new.as_ptr(),
        Ordering::AcqRel,
        Ordering::Acquire,
      ) {
        Ok(_) => {
          #[cfg(feature = "tracing")]
          tracing::debug!(
            "publish segment at {:p} with {} elements after {} hops",
            new,
            written,
            _hops
          );

          // Safety: the segment is now owned by the chain.
          return Ok((unsafe { &*new.as_ptr() }, written));
        }
        Err(next) => {
          #[cfg(feature = "tracing")]
          tracing::trace!("lost publish race at {:p}, moving forward", tail);

          // Safety: a published link always points to a live segment.
          tail = unsafe { &*next };
          _hops += 1;
        }
      }
    }
  }

  #[cfg(test)]
  pub(crate) fn hint(&self) -> Option<&Segment<T>> {
    unsafe { self.hint.load(Ordering::Acquire).as_ref() }
  }

  #[cfg(test)]
  pub(crate) fn set_hint(&self, seg: &Segment<T>) {
    self
      .hint
      .store(seg as *const Segment<T> as *mut Segment<T>, Ordering::Release);
  }
}

impl<'a, T: Pod, A: Allocator> IntoIterator for &'a Chain<T, A> {
  type Item = &'a T;
  type IntoIter = Iter<'a, T>;

  #[inline]
  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

impl<'a, T: Pod, A: Allocator> IntoIterator for &'a mut Chain<T, A> {
  type Item = &'a mut T;
  type IntoIter = IterMut<'a, T>;

  #[inline]
  fn into_iter(self) -> Self::IntoIter {
    self.iter_mut()
  }
}

/// A handle for appending to a [`Chain`] from many threads at once.
///
/// Obtained from [`Chain::writer`]. While any writer is alive, the chain can
/// only be appended to.
pub struct Writer<'a, T: Pod, A: Allocator = Global> {
  chain: &'a Chain<T, A>,
}

impl<T: Pod, A: Allocator> Clone for Writer<'_, T, A> {
  #[inline]
  fn clone(&self) -> Self {
    *self
  }
}

impl<T: Pod, A: Allocator> Copy for Writer<'_, T, A> {}

impl<T: Pod, A: Allocator> fmt::Debug for Writer<'_, T, A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Writer")
      .field("capacity_per_segment", &self.chain.cap)
      .finish_non_exhaustive()
  }
}

impl<T: Pod, A: Allocator> Writer<'_, T, A> {
  /// Appends an element.
  ///
  /// Lock-free: the call never blocks, it retries until it claims a slot,
  /// extending the chain when every segment is full.
  ///
  /// Elements appended by different calls are not ordered relative to each other.
  #[inline]
  pub fn add_concurrent(&self, val: T) -> Result<(), Error> {
    self.chain.add_concurrent(val)
  }

  /// Appends every element of `vals`.
  ///
  /// Each contiguous run placed into one segment keeps the order of `vals`,
  /// but the runs may be spread over several segments, and under contention
  /// those segments are not necessarily consecutive.
  ///
  /// On allocation failure, the elements placed before the failure stay in the chain.
  #[inline]
  pub fn add_range_concurrent(&self, vals: &[T]) -> Result<(), Error> {
    self.chain.add_range_concurrent(vals)
  }
}
