use crate::{Allocator, Chain, Error, Global, Lifetime, Pod};

/// Options for creating a [`Chain`].
#[derive(Debug, Clone, Copy)]
pub struct ChainOptions {
  capacity: usize,
  lifetime: Lifetime,
}

impl Default for ChainOptions {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl ChainOptions {
  /// Create an options for creating a chain with default values.
  #[inline]
  pub const fn new() -> Self {
    Self {
      capacity: 64,
      lifetime: Lifetime::Persistent,
    }
  }

  /// Set the number of elements stored by each segment.
  ///
  /// Every segment of a chain has the same capacity, the chain grows one
  /// segment at a time when all existing segments are full.
  ///
  /// The capacity must be greater than zero.
  /// The default capacity is `64`.
  ///
  /// # Example
  ///
  /// ```
  /// use segchain::ChainOptions;
  ///
  /// let opts = ChainOptions::new().with_capacity(256);
  /// ```
  #[inline]
  pub const fn with_capacity(mut self, capacity: usize) -> Self {
    assert!(capacity > 0, "segment capacity must be greater than zero");
    self.capacity = capacity;
    self
  }

  /// Set the lifetime tag passed to the allocator for every allocation made by the chain.
  ///
  /// The default lifetime is [`Lifetime::Persistent`].
  ///
  /// # Example
  ///
  /// ```
  /// use segchain::{ChainOptions, Lifetime};
  ///
  /// let opts = ChainOptions::new().with_lifetime(Lifetime::Scoped);
  /// ```
  #[inline]
  pub const fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
    self.lifetime = lifetime;
    self
  }

  /// Get the number of elements stored by each segment.
  ///
  /// # Example
  ///
  /// ```
  /// use segchain::ChainOptions;
  ///
  /// let opts = ChainOptions::new().with_capacity(256);
  /// assert_eq!(opts.capacity(), 256);
  /// ```
  #[inline]
  pub const fn capacity(&self) -> usize {
    self.capacity
  }

  /// Get the lifetime tag.
  #[inline]
  pub const fn lifetime(&self) -> Lifetime {
    self.lifetime
  }

  /// Creates a [`Chain`] backed by the [`Global`] allocator.
  ///
  /// # Example
  ///
  /// ```
  /// use segchain::ChainOptions;
  ///
  /// let chain = ChainOptions::new().with_capacity(4).build::<u32>().unwrap();
  /// assert!(chain.is_empty());
  /// ```
  #[inline]
  pub fn build<T: Pod>(self) -> Result<Chain<T, Global>, Error> {
    Chain::with_options_in(self, Global)
  }

  /// Creates a [`Chain`] backed by the given allocator.
  #[inline]
  pub fn build_in<T: Pod, A: Allocator>(self, alloc: A) -> Result<Chain<T, A>, Error> {
    Chain::with_options_in(self, alloc)
  }
}
