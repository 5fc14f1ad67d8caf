//! Element-wise reduction kernels used by the collective engine.

use crate::error::{Result, ShmemError};
use crate::scalar::Scalar;
use crate::types::ReduceOp;

/// Scalars that can be combined by the `to_all` operator set.
pub trait Reducible: Scalar {
    /// `op(a, b)`. Bitwise ops on floats are rejected before this is reached.
    fn reduce(a: Self, b: Self, op: ReduceOp) -> Self;

    fn supports(op: ReduceOp) -> bool;
}

macro_rules! impl_reducible {
    (int: $($ty:ty),*) => {
        $(
            impl Reducible for $ty {
                #[inline]
                fn reduce(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => a.wrapping_add(b),
                        ReduceOp::Prod => a.wrapping_mul(b),
                        ReduceOp::Min => a.min(b),
                        ReduceOp::Max => a.max(b),
                        ReduceOp::And => a & b,
                        ReduceOp::Or => a | b,
                        ReduceOp::Xor => a ^ b,
                    }
                }

                #[inline]
                fn supports(_op: ReduceOp) -> bool {
                    true
                }
            }
        )*
    };
    (float: $($ty:ty),*) => {
        $(
            impl Reducible for $ty {
                #[inline]
                fn reduce(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => a + b,
                        ReduceOp::Prod => a * b,
                        ReduceOp::Min => a.min(b),
                        ReduceOp::Max => a.max(b),
                        ReduceOp::And | ReduceOp::Or | ReduceOp::Xor => {
                            unreachable!("bitwise reduction on float rejected by check_op")
                        }
                    }
                }

                #[inline]
                fn supports(op: ReduceOp) -> bool {
                    !op.is_bitwise()
                }
            }
        )*
    };
}

impl_reducible!(int: i8, i16, i32, i64, u8, u16, u32, u64);
impl_reducible!(float: f32, f64);

pub(crate) fn check_op<T: Reducible>(op: ReduceOp) -> Result<()> {
    if T::supports(op) {
        Ok(())
    } else {
        Err(ShmemError::UnsupportedOp {
            op,
            dtype: T::DTYPE,
        })
    }
}

/// `acc[i] = op(acc[i], src[i])`.
///
/// Callers fold contributions in a fixed participant order; the kernel itself
/// never reorders, which keeps floating-point results reproducible.
pub(crate) fn reduce_into<T: Reducible>(acc: &mut [T], src: &[T], op: ReduceOp) -> Result<()> {
    check_op::<T>(op)?;
    debug_assert_eq!(acc.len(), src.len());
    for (a, &s) in acc.iter_mut().zip(src) {
        *a = T::reduce(*a, s, op);
    }
    Ok(())
}
