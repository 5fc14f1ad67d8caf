//! Put and get entry points.

use super::Context;
use crate::error::{Result, ShmemError};
use crate::scalar::{Scalar, decode_into, encode};
use crate::transport::WorkOp;
use crate::types::{Pe, SymAddr};

fn check_aligned<T: Scalar>(addr: SymAddr) -> Result<()> {
    if addr.is_aligned(T::WIDTH) {
        Ok(())
    } else {
        Err(ShmemError::Misaligned {
            addr,
            align: T::WIDTH,
        })
    }
}

impl Context {
    fn put_bytes(&self, dest: SymAddr, payload: Vec<u8>, pe: Pe, blocking: bool) -> Result<()> {
        self.check_usable(true)?;
        self.check_pe(pe)?;
        if payload.is_empty() {
            return Ok(());
        }
        self.write_unchecked(dest, payload, pe, blocking)
    }

    fn write_unchecked(&self, dest: SymAddr, payload: Vec<u8>, pe: Pe, blocking: bool) -> Result<()> {
        // SAFETY: writes reference no local memory after submission.
        let signal = unsafe { self.post(dest, pe, WorkOp::Write { payload }, blocking)? };
        if blocking {
            self.wait_signal(signal)?;
        }
        Ok(())
    }

    /// Blocking write of one runtime-owned sync word. Allowed on every
    /// context, including `NOSTORE` ones.
    pub(crate) fn put_sync_word(&self, dest: SymAddr, value: u64, pe: Pe) -> Result<()> {
        self.check_usable(false)?;
        self.check_pe(pe)?;
        self.write_unchecked(dest, value.to_le_bytes().to_vec(), pe, true)
    }

    /// # Safety
    /// `local` must be valid for `len` bytes. When `blocking` is false it must
    /// stay valid and untouched until the next `quiet`.
    unsafe fn get_bytes(
        &self,
        local: *mut u8,
        source: SymAddr,
        len: usize,
        pe: Pe,
        blocking: bool,
    ) -> Result<()> {
        self.check_usable(false)?;
        self.check_pe(pe)?;
        if len == 0 {
            return Ok(());
        }
        let op = WorkOp::Read {
            local: local as u64,
            len,
        };
        // SAFETY: forwarded from the caller.
        let signal = unsafe { self.post(source, pe, op, blocking)? };
        if blocking {
            self.wait_signal(signal)?;
        }
        Ok(())
    }

    /// Copy `source` to `dest` on `pe`. The payload is staged before the call
    /// returns; remote visibility needs `quiet`.
    pub fn put<T: Scalar>(&self, dest: SymAddr, source: &[T], pe: Pe) -> Result<()> {
        self.run("put", || {
            check_aligned::<T>(dest)?;
            self.put_bytes(dest, encode(source), pe, true)
        })
    }

    /// Non-blocking put; `source` may be reused as soon as the call returns.
    pub fn put_nbi<T: Scalar>(&self, dest: SymAddr, source: &[T], pe: Pe) -> Result<()> {
        self.run("put_nbi", || {
            check_aligned::<T>(dest)?;
            self.put_bytes(dest, encode(source), pe, false)
        })
    }

    /// Single-element put.
    pub fn p<T: Scalar>(&self, dest: SymAddr, value: T, pe: Pe) -> Result<()> {
        self.put(dest, std::slice::from_ref(&value), pe)
    }

    pub fn putmem(&self, dest: SymAddr, source: &[u8], pe: Pe) -> Result<()> {
        self.run("putmem", || self.put_bytes(dest, source.to_vec(), pe, true))
    }

    pub fn putmem_nbi(&self, dest: SymAddr, source: &[u8], pe: Pe) -> Result<()> {
        self.run("putmem_nbi", || self.put_bytes(dest, source.to_vec(), pe, false))
    }

    /// Fill `dest` from `source` on `pe`, returning once the data is local.
    pub fn get<T: Scalar>(&self, dest: &mut [T], source: SymAddr, pe: Pe) -> Result<()> {
        self.run("get", || {
            check_aligned::<T>(source)?;
            let mut staged = vec![0u8; dest.len() * T::WIDTH];
            // SAFETY: blocking; `staged` outlives the completion.
            unsafe { self.get_bytes(staged.as_mut_ptr(), source, staged.len(), pe, true)? };
            decode_into(&staged, dest);
            Ok(())
        })
    }

    /// Single-element get.
    pub fn g<T: Scalar>(&self, source: SymAddr, pe: Pe) -> Result<T> {
        let mut out = [T::from_bits(0)];
        self.get(&mut out, source, pe)?;
        Ok(out[0])
    }

    pub fn getmem(&self, dest: &mut [u8], source: SymAddr, pe: Pe) -> Result<()> {
        self.run("getmem", || {
            // SAFETY: blocking; `dest` is borrowed for the whole call.
            unsafe { self.get_bytes(dest.as_mut_ptr(), source, dest.len(), pe, true) }
        })
    }

    /// Start fetching `nelems` elements from `source` on `pe` into `dest`.
    ///
    /// Symmetric memory is copied verbatim, so on the little-endian hosts
    /// this runtime targets `dest` receives the values that were put.
    ///
    /// # Safety
    /// `dest` must be valid for writes of `nelems` elements and must not be
    /// read, written or freed until the next [`Context::quiet`] on this
    /// context returns.
    pub unsafe fn get_nbi<T: Scalar>(
        &self,
        dest: *mut T,
        source: SymAddr,
        nelems: usize,
        pe: Pe,
    ) -> Result<()> {
        self.run("get_nbi", || {
            check_aligned::<T>(source)?;
            // SAFETY: forwarded from the caller.
            unsafe { self.get_bytes(dest.cast(), source, nelems * T::WIDTH, pe, false) }
        })
    }

    /// Byte-granular [`Context::get_nbi`].
    ///
    /// # Safety
    /// Same contract as [`Context::get_nbi`] for `nbytes` bytes at `dest`.
    pub unsafe fn getmem_nbi(
        &self,
        dest: *mut u8,
        source: SymAddr,
        nbytes: usize,
        pe: Pe,
    ) -> Result<()> {
        // SAFETY: forwarded from the caller.
        self.run("getmem_nbi", || unsafe {
            self.get_bytes(dest, source, nbytes, pe, false)
        })
    }
}
