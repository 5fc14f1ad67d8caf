//! Remote atomic memory operations.
//!
//! Non-fetching forms return after submission and are covered by `quiet`.
//! Fetching forms block until the previous remote value comes back.

use super::Context;
use crate::error::{Result, ShmemError};
use crate::scalar::AmoScalar;
use crate::transport::WorkOp;
use crate::types::{Pe, SymAddr};

impl Context {
    fn amo<T: AmoScalar>(
        &self,
        dest: SymAddr,
        pe: Pe,
        op: WorkOp,
        stores: bool,
        fetch: bool,
    ) -> Result<Option<T>> {
        self.check_usable(stores)?;
        self.check_pe(pe)?;
        if !self.supports_atomic_width(T::WIDTH) {
            return Err(ShmemError::UnsupportedAtomicWidth { width: T::WIDTH });
        }
        if !dest.is_aligned(T::WIDTH) {
            return Err(ShmemError::Misaligned {
                addr: dest,
                align: T::WIDTH,
            });
        }
        // SAFETY: atomics reference no local memory.
        let signal = unsafe { self.post(dest, pe, op, fetch)? };
        if fetch {
            let old = self.wait_signal(signal)?;
            Ok(Some(T::from_bits(old)))
        } else {
            Ok(None)
        }
    }

    fn fetch_add<T: AmoScalar>(&self, dest: SymAddr, value: T, pe: Pe, fetch: bool) -> Result<Option<T>> {
        let op = WorkOp::FetchAdd {
            width: T::WIDTH,
            value: value.to_bits(),
        };
        self.amo(dest, pe, op, true, fetch)
    }

    fn cas<T: AmoScalar>(
        &self,
        dest: SymAddr,
        value: T,
        cond: T,
        pe: Pe,
        fetch: bool,
    ) -> Result<Option<T>> {
        let op = WorkOp::CompareSwap {
            width: T::WIDTH,
            cond: cond.to_bits(),
            value: value.to_bits(),
        };
        self.amo(dest, pe, op, true, fetch)
    }

    fn swap<T: AmoScalar>(&self, dest: SymAddr, value: T, pe: Pe, fetch: bool) -> Result<Option<T>> {
        let op = WorkOp::Swap {
            width: T::WIDTH,
            value: value.to_bits(),
        };
        self.amo(dest, pe, op, true, fetch)
    }

    /// Non-fetching add on a runtime-owned sync word. Allowed on every
    /// context, including `NOSTORE` ones.
    pub(crate) fn add_sync_word(&self, dest: SymAddr, value: i64, pe: Pe) -> Result<()> {
        let op = WorkOp::FetchAdd {
            width: 8,
            value: value as u64,
        };
        self.amo::<i64>(dest, pe, op, false, false).map(|_| ())
    }

    /// Add `value` to `dest` on `pe` (wrapping).
    pub fn amo_add<T: AmoScalar>(&self, dest: SymAddr, value: T, pe: Pe) -> Result<()> {
        self.run("amo_add", || self.fetch_add(dest, value, pe, false).map(|_| ()))
    }

    /// Set `dest` on `pe` to `value` if it currently equals `cond`.
    pub fn amo_cas<T: AmoScalar>(&self, dest: SymAddr, value: T, cond: T, pe: Pe) -> Result<()> {
        self.run("amo_cas", || self.cas(dest, value, cond, pe, false).map(|_| ()))
    }

    pub fn amo_inc<T: AmoScalar>(&self, dest: SymAddr, pe: Pe) -> Result<()> {
        self.run("amo_inc", || {
            self.fetch_add(dest, T::from_bits(1), pe, false).map(|_| ())
        })
    }

    /// Atomic write.
    pub fn amo_set<T: AmoScalar>(&self, dest: SymAddr, value: T, pe: Pe) -> Result<()> {
        self.run("amo_set", || self.swap(dest, value, pe, false).map(|_| ()))
    }

    pub fn amo_fetch_add<T: AmoScalar>(&self, dest: SymAddr, value: T, pe: Pe) -> Result<T> {
        self.run("amo_fetch_add", || fetched(self.fetch_add(dest, value, pe, true)))
    }

    /// Compare-and-swap returning the value found at `dest`; the swap happened
    /// iff that value equals `cond`.
    pub fn amo_fetch_cas<T: AmoScalar>(&self, dest: SymAddr, value: T, cond: T, pe: Pe) -> Result<T> {
        self.run("amo_fetch_cas", || fetched(self.cas(dest, value, cond, pe, true)))
    }

    pub fn amo_fetch_inc<T: AmoScalar>(&self, dest: SymAddr, pe: Pe) -> Result<T> {
        self.run("amo_fetch_inc", || {
            fetched(self.fetch_add(dest, T::from_bits(1), pe, true))
        })
    }

    /// Atomic read. Allowed on `NOSTORE` contexts.
    pub fn amo_fetch<T: AmoScalar>(&self, source: SymAddr, pe: Pe) -> Result<T> {
        self.run("amo_fetch", || {
            let op = WorkOp::FetchAdd {
                width: T::WIDTH,
                value: 0,
            };
            fetched(self.amo(source, pe, op, false, true))
        })
    }

    /// Atomic exchange returning the previous value.
    pub fn amo_swap<T: AmoScalar>(&self, dest: SymAddr, value: T, pe: Pe) -> Result<T> {
        self.run("amo_swap", || fetched(self.swap(dest, value, pe, true)))
    }
}

fn fetched<T>(r: Result<Option<T>>) -> Result<T> {
    r?.ok_or_else(|| ShmemError::transport("fetching atomic returned no value"))
}
