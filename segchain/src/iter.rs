use core::{iter::FusedIterator, marker::PhantomData, ptr::NonNull, slice};

use crate::{
  common::{AtomicPtr, Ordering},
  Pod, Segment, SegmentMut,
};

/// An iterator over the segments of a [`Chain`](crate::Chain), from the head to the tail.
///
/// Created by [`Chain::segments`](crate::Chain::segments).
pub struct Segments<'a, T> {
  next: Option<&'a Segment<T>>,
}

impl<'a, T: Pod> Segments<'a, T> {
  #[inline]
  pub(crate) fn new(head: Option<&'a Segment<T>>) -> Self {
    Self { next: head }
  }
}

impl<T> Clone for Segments<'_, T> {
  #[inline]
  fn clone(&self) -> Self {
    Self { next: self.next }
  }
}

impl<'a, T: Pod> Iterator for Segments<'a, T> {
  type Item = &'a Segment<T>;

  #[inline]
  fn next(&mut self) -> Option<Self::Item> {
    let current = self.next?;
    self.next = current.next();
    Some(current)
  }
}

impl<T: Pod> FusedIterator for Segments<'_, T> {}

/// A mutable iterator over the segments of a [`Chain`](crate::Chain).
///
/// Created by [`Chain::segments_mut`](crate::Chain::segments_mut).
pub struct SegmentsMut<'a, T> {
  next: Option<NonNull<Segment<T>>>,
  hint: &'a AtomicPtr<Segment<T>>,
  _marker: PhantomData<&'a mut Segment<T>>,
}

impl<'a, T: Pod> SegmentsMut<'a, T> {
  /// ## Safety
  /// - `head` must be the head of the chain owning `hint`, mutably borrowed for `'a`.
  #[inline]
  pub(crate) unsafe fn new(head: Option<NonNull<Segment<T>>>, hint: &'a AtomicPtr<Segment<T>>) -> Self {
    Self {
      next: head,
      hint,
      _marker: PhantomData,
    }
  }
}

impl<'a, T: Pod> Iterator for SegmentsMut<'a, T> {
  type Item = SegmentMut<'a, T>;

  #[inline]
  fn next(&mut self) -> Option<Self::Item> {
    let current = self.next?;
    // Safety: the segment is live while the chain is borrowed.
    self.next = NonNull::new(unsafe { current.as_ref() }.next_link().load(Ordering::Acquire));
    // Safety: the chain is mutably borrowed for 'a and each segment is yielded once.
    Some(unsafe { SegmentMut::new(current, self.hint) })
  }
}

impl<T: Pod> FusedIterator for SegmentsMut<'_, T> {}

/// An iterator over the elements of a [`Chain`](crate::Chain), in traversal order.
///
/// Created by [`Chain::iter`](crate::Chain::iter).
pub struct Iter<'a, T> {
  segments: Segments<'a, T>,
  current: slice::Iter<'a, T>,
  remaining: usize,
}

impl<'a, T: Pod> Iter<'a, T> {
  #[inline]
  pub(crate) fn new(segments: Segments<'a, T>) -> Self {
    // occupancy cannot change while the chain is shared.
    let remaining = segments.clone().map(Segment::len).sum();
    Self {
      segments,
      current: Default::default(),
      remaining,
    }
  }
}

impl<T> Clone for Iter<'_, T> {
  #[inline]
  fn clone(&self) -> Self {
    Self {
      segments: self.segments.clone(),
      current: self.current.clone(),
      remaining: self.remaining,
    }
  }
}

impl<'a, T: Pod> Iterator for Iter<'a, T> {
  type Item = &'a T;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if let Some(val) = self.current.next() {
        self.remaining -= 1;
        return Some(val);
      }
      self.current = self.segments.next()?.as_slice().iter();
    }
  }

  #[inline]
  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.remaining, Some(self.remaining))
  }
}

impl<T: Pod> ExactSizeIterator for Iter<'_, T> {}

impl<T: Pod> FusedIterator for Iter<'_, T> {}

/// A mutable iterator over the elements of a [`Chain`](crate::Chain).
///
/// Created by [`Chain::iter_mut`](crate::Chain::iter_mut).
pub struct IterMut<'a, T> {
  segments: SegmentsMut<'a, T>,
  current: slice::IterMut<'a, T>,
}

impl<'a, T: Pod> IterMut<'a, T> {
  #[inline]
  pub(crate) fn new(segments: SegmentsMut<'a, T>) -> Self {
    Self {
      segments,
      current: Default::default(),
    }
  }
}

impl<'a, T: Pod> Iterator for IterMut<'a, T> {
  type Item = &'a mut T;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if let Some(val) = self.current.next() {
        return Some(val);
      }
      self.current = self.segments.next()?.into_mut_slice().iter_mut();
    }
  }
}

impl<T: Pod> FusedIterator for IterMut<'_, T> {}
