/// Plain-old-data element types which can be stored in a [`Chain`](crate::Chain).
///
/// Segments hand out raw slots, copy runs of elements with `memcpy` and zero
/// their payload buffers before first use, so the element type must not own
/// any resource and must accept any bit pattern.
///
/// # Safety
///
/// Implementors must guarantee that:
/// - every bit pattern of `size_of::<Self>()` bytes, including all zeros, is a valid `Self`;
/// - `Self` contains no padding bytes;
/// - `Self` has no drop glue and no interior mutability.
pub unsafe trait Pod: Copy + Send + Sync + 'static {}

macro_rules! impl_pod {
  ($($ty:ty),+ $(,)?) => {
    $(
      unsafe impl Pod for $ty {}
    )*
  };
}

impl_pod!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);

unsafe impl<T: Pod, const N: usize> Pod for [T; N] {}
