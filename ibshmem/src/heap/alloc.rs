use crate::error::{Result, ShmemError};
use crate::types::SymAddr;

/// Deterministic bump allocator over the symmetric heap.
///
/// Every PE that performs the same sequence of allocations gets the same
/// addresses, which is what makes the heap symmetric. Memory is never
/// returned; the allocator is reset with the job.
#[derive(Debug)]
pub struct SymmetricAllocator {
    top: u64,
    limit: u64,
}

impl SymmetricAllocator {
    /// Allocator handing out `[base, limit)`.
    pub fn new(base: SymAddr, limit: u64) -> Self {
        Self {
            top: base.as_u64(),
            limit,
        }
    }

    /// Allocate `size` bytes aligned to `align` (a power of two, at least 8).
    pub fn alloc(&mut self, size: usize, align: usize) -> Result<SymAddr> {
        let align = align.max(8).next_power_of_two() as u64;
        let start = self.top.div_ceil(align) * align;
        let end = start.checked_add(size as u64);
        match end {
            Some(end) if end <= self.limit => {
                // Keep every allocation word-aligned at its end as well.
                self.top = end.div_ceil(8) * 8;
                Ok(SymAddr::new(start))
            }
            _ => Err(ShmemError::OutOfMemory {
                requested: size,
                available: self.limit.saturating_sub(start) as usize,
            }),
        }
    }

    /// Bytes still available (ignoring alignment padding).
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.top) as usize
    }
}
