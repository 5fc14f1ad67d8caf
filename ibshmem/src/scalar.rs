//! The closed set of element types accepted by typed operations.
//!
//! Values travel through the heap and the transport as little-endian bytes,
//! or as zero-extended `u64` bit patterns for single-word operations.

use crate::types::DataType;

mod private {
    pub trait Sealed {}
}

/// A fixed-width element type usable with typed put/get, waits and reductions.
pub trait Scalar:
    private::Sealed + Copy + PartialOrd + Send + Sync + std::fmt::Debug + 'static
{
    const DTYPE: DataType;
    const WIDTH: usize;

    /// Zero-extended little-endian bit pattern.
    fn to_bits(self) -> u64;

    /// Inverse of [`Scalar::to_bits`]; upper bits are ignored.
    fn from_bits(bits: u64) -> Self;

    fn write_le(self, out: &mut [u8]);

    fn read_le(bytes: &[u8]) -> Self;
}

/// Integer scalars, the only types remote atomics accept.
pub trait AmoScalar: Scalar {}

macro_rules! impl_scalar {
    ($($ty:ty => $dtype:ident as $bits:ty),* $(,)?) => {
        $(
            impl private::Sealed for $ty {}

            impl Scalar for $ty {
                const DTYPE: DataType = DataType::$dtype;
                const WIDTH: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn to_bits(self) -> u64 {
                    <$bits>::from_le_bytes(self.to_le_bytes()) as u64
                }

                #[inline]
                fn from_bits(bits: u64) -> Self {
                    Self::from_le_bytes((bits as $bits).to_le_bytes())
                }

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out[..Self::WIDTH].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::WIDTH]);
                    Self::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_scalar!(
    i8 => I8 as u8,
    i16 => I16 as u16,
    i32 => I32 as u32,
    i64 => I64 as u64,
    u8 => U8 as u8,
    u16 => U16 as u16,
    u32 => U32 as u32,
    u64 => U64 as u64,
    f32 => F32 as u32,
    f64 => F64 as u64,
);

impl AmoScalar for i8 {}
impl AmoScalar for i16 {}
impl AmoScalar for i32 {}
impl AmoScalar for i64 {}
impl AmoScalar for u8 {}
impl AmoScalar for u16 {}
impl AmoScalar for u32 {}
impl AmoScalar for u64 {}

/// Stage a typed slice as little-endian bytes.
pub(crate) fn encode<T: Scalar>(src: &[T]) -> Vec<u8> {
    let mut out = vec![0u8; src.len() * T::WIDTH];
    for (chunk, v) in out.chunks_exact_mut(T::WIDTH).zip(src) {
        v.write_le(chunk);
    }
    out
}

/// Unstage little-endian bytes into a typed slice.
pub(crate) fn decode_into<T: Scalar>(bytes: &[u8], dst: &mut [T]) {
    for (v, chunk) in dst.iter_mut().zip(bytes.chunks_exact(T::WIDTH)) {
        *v = T::read_le(chunk);
    }
}
