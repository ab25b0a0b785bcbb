#![doc = include_str!("../README.md")]
#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]
#![deny(missing_docs)]

#[cfg(not(any(feature = "std", feature = "alloc")))]
compile_error!("`segchain` requires either the 'std' or 'alloc' feature to be enabled");

#[cfg(not(feature = "std"))]
extern crate alloc as std;

#[cfg(feature = "std")]
extern crate std;

mod allocator;
pub use allocator::*;

mod chain;
pub use chain::*;

mod error;
pub use error::*;

/// Iterators over the segments and elements of a [`Chain`].
pub mod iter;

mod options;
pub use options::*;

mod pod;
pub use pod::*;

mod segment;
pub use segment::*;


mod common {
  #[cfg(not(feature = "loom"))]
  pub(crate) use std::alloc::{alloc, dealloc, Layout};

  #[cfg(feature = "loom")]
  pub(crate) use loom::alloc::{alloc, dealloc, Layout};

  #[cfg(not(feature = "loom"))]
  pub(crate) use core::sync::atomic::*;

  #[cfg(feature = "loom")]
  pub(crate) use loom::sync::atomic::*;
}
