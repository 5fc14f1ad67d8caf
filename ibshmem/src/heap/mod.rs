//! Symmetric heap storage for one PE.
//!
//! The heap is backed by `AtomicU64` words. Every access that fits inside one
//! naturally aligned word (all scalar loads, stores and atomics) is a single
//! atomic operation on that word, so a poller can never observe a torn
//! scalar. Bulk copies are word-atomic piecewise and carry release/acquire
//! ordering, so a value observed through [`Observe`] makes every earlier write
//! by the same writer visible.

mod alloc;

pub use alloc::SymmetricAllocator;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, ShmemError};
use crate::scalar::Scalar;
use crate::types::{Pe, SymAddr};

/// Reads a single scalar of local symmetric memory as one indivisible value.
///
/// The polling synchronizer evaluates predicates over values produced by an
/// `Observe` implementation; the heap is the production one.
pub trait Observe: Send + Sync {
    /// Load `width` bytes (1, 2, 4 or 8) at `addr`, zero-extended.
    fn observe(&self, addr: SymAddr, width: usize) -> Result<u64>;
}

pub struct SymmetricHeap {
    pe: Pe,
    words: Box<[AtomicU64]>,
    len: usize,
}

#[inline]
fn width_mask(width: usize) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (8 * width)) - 1
    }
}

impl SymmetricHeap {
    /// Zero-filled heap of at least `len` bytes (rounded up to whole words).
    pub fn new(pe: Pe, len: usize) -> Self {
        let n_words = len.div_ceil(8);
        let words = (0..n_words).map(|_| AtomicU64::new(0)).collect();
        Self {
            pe,
            words,
            len: n_words * 8,
        }
    }

    pub fn pe(&self) -> Pe {
        self.pe
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn range(&self, addr: SymAddr, len: usize) -> Result<usize> {
        let start = usize::try_from(addr.as_u64()).ok();
        match start.and_then(|s| s.checked_add(len).map(|end| (s, end))) {
            Some((s, end)) if end <= self.len => Ok(s),
            _ => Err(ShmemError::Unregistered {
                addr,
                len,
                pe: self.pe,
            }),
        }
    }

    /// Offset of a naturally aligned scalar of `width` bytes.
    fn scalar_at(&self, addr: SymAddr, width: usize) -> Result<usize> {
        if !matches!(width, 1 | 2 | 4 | 8) || !addr.is_aligned(width) {
            return Err(ShmemError::Misaligned {
                addr,
                align: width.max(1),
            });
        }
        self.range(addr, width)
    }

    /// Copy `src` into the heap at `addr`.
    pub fn write_bytes(&self, addr: SymAddr, src: &[u8]) -> Result<()> {
        let mut pos = self.range(addr, src.len())?;
        let mut rest = src;
        while !rest.is_empty() {
            let word = &self.words[pos / 8];
            let shift = pos % 8;
            let take = (8 - shift).min(rest.len());
            if take == 8 {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&rest[..8]);
                word.store(u64::from_le_bytes(raw), Ordering::Release);
            } else {
                let mut bits = 0u64;
                for (k, &b) in rest[..take].iter().enumerate() {
                    bits |= (b as u64) << (8 * (shift + k));
                }
                let mask = width_mask(take) << (8 * shift);
                // The closure never declines, so the update always lands.
                let _ = word.fetch_update(Ordering::Release, Ordering::Relaxed, |old| {
                    Some((old & !mask) | bits)
                });
            }
            pos += take;
            rest = &rest[take..];
        }
        Ok(())
    }

    /// Copy heap bytes at `addr` into `dst`.
    pub fn read_bytes(&self, addr: SymAddr, dst: &mut [u8]) -> Result<()> {
        let mut pos = self.range(addr, dst.len())?;
        let mut filled = 0;
        while filled < dst.len() {
            let shift = pos % 8;
            let take = (8 - shift).min(dst.len() - filled);
            let bytes = self.words[pos / 8].load(Ordering::Acquire).to_le_bytes();
            dst[filled..filled + take].copy_from_slice(&bytes[shift..shift + take]);
            pos += take;
            filled += take;
        }
        Ok(())
    }

    pub fn load_bits(&self, addr: SymAddr, width: usize) -> Result<u64> {
        let off = self.scalar_at(addr, width)?;
        let word = self.words[off / 8].load(Ordering::Acquire);
        Ok((word >> (8 * (off % 8))) & width_mask(width))
    }

    pub fn store_bits(&self, addr: SymAddr, width: usize, bits: u64) -> Result<()> {
        self.swap_bits(addr, width, bits).map(|_| ())
    }

    /// Atomically replace the scalar at `addr`, returning the previous bits.
    pub fn swap_bits(&self, addr: SymAddr, width: usize, bits: u64) -> Result<u64> {
        let off = self.scalar_at(addr, width)?;
        let word = &self.words[off / 8];
        if width == 8 {
            return Ok(word.swap(bits, Ordering::AcqRel));
        }
        let shift = 8 * (off % 8);
        let mask = width_mask(width);
        let new = (bits & mask) << shift;
        let old = match word.fetch_update(Ordering::AcqRel, Ordering::Acquire, |old| {
            Some((old & !(mask << shift)) | new)
        }) {
            Ok(old) | Err(old) => old,
        };
        Ok((old >> shift) & mask)
    }

    /// Wrapping add on the scalar at `addr`, returning the previous bits.
    pub fn fetch_add_bits(&self, addr: SymAddr, width: usize, bits: u64) -> Result<u64> {
        let off = self.scalar_at(addr, width)?;
        let word = &self.words[off / 8];
        if width == 8 {
            return Ok(word.fetch_add(bits, Ordering::AcqRel));
        }
        let shift = 8 * (off % 8);
        let mask = width_mask(width);
        let old = match word.fetch_update(Ordering::AcqRel, Ordering::Acquire, |old| {
            let field = (old >> shift) & mask;
            let sum = field.wrapping_add(bits) & mask;
            Some((old & !(mask << shift)) | (sum << shift))
        }) {
            Ok(old) | Err(old) => old,
        };
        Ok((old >> shift) & mask)
    }

    /// Set the scalar at `addr` to `value` iff it equals `cond`. Returns the
    /// previous bits either way.
    pub fn compare_swap_bits(
        &self,
        addr: SymAddr,
        width: usize,
        cond: u64,
        value: u64,
    ) -> Result<u64> {
        let off = self.scalar_at(addr, width)?;
        let word = &self.words[off / 8];
        if width == 8 {
            return Ok(
                match word.compare_exchange(cond, value, Ordering::AcqRel, Ordering::Acquire) {
                    Ok(old) | Err(old) => old,
                },
            );
        }
        let shift = 8 * (off % 8);
        let mask = width_mask(width);
        let (cond, value) = (cond & mask, value & mask);
        let old = match word.fetch_update(Ordering::AcqRel, Ordering::Acquire, |old| {
            ((old >> shift) & mask == cond).then_some((old & !(mask << shift)) | (value << shift))
        }) {
            Ok(old) | Err(old) => old,
        };
        Ok((old >> shift) & mask)
    }

    pub fn read<T: Scalar>(&self, addr: SymAddr) -> Result<T> {
        self.load_bits(addr, T::WIDTH).map(T::from_bits)
    }

    pub fn write<T: Scalar>(&self, addr: SymAddr, value: T) -> Result<()> {
        self.store_bits(addr, T::WIDTH, value.to_bits())
    }

    pub fn read_slice<T: Scalar>(&self, addr: SymAddr, dst: &mut [T]) -> Result<()> {
        if !addr.is_aligned(T::WIDTH) {
            return Err(ShmemError::Misaligned {
                addr,
                align: T::WIDTH,
            });
        }
        let mut bytes = vec![0u8; dst.len() * T::WIDTH];
        self.read_bytes(addr, &mut bytes)?;
        crate::scalar::decode_into(&bytes, dst);
        Ok(())
    }

    pub fn write_slice<T: Scalar>(&self, addr: SymAddr, src: &[T]) -> Result<()> {
        if !addr.is_aligned(T::WIDTH) {
            return Err(ShmemError::Misaligned {
                addr,
                align: T::WIDTH,
            });
        }
        self.write_bytes(addr, &crate::scalar::encode(src))
    }
}

impl Observe for SymmetricHeap {
    fn observe(&self, addr: SymAddr, width: usize) -> Result<u64> {
        self.load_bits(addr, width)
    }
}

impl std::fmt::Debug for SymmetricHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricHeap")
            .field("pe", &self.pe)
            .field("len", &self.len)
            .finish()
    }
}
