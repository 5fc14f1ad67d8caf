//! Remote window lookup: symmetric address + PE → remote key and offset.

use crate::error::{Result, ShmemError};
use crate::types::{Pe, SymAddr};

/// A remotely accessible region of one peer's symmetric heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteWindow {
    pub pe: Pe,
    pub base: SymAddr,
    pub key: u32,
    pub len: usize,
}

impl RemoteWindow {
    fn covers(&self, addr: SymAddr, len: usize) -> bool {
        let start = addr.as_u64();
        let base = self.base.as_u64();
        start >= base
            && start
                .checked_add(len as u64)
                .is_some_and(|end| end <= base + self.len as u64)
    }
}

/// What the transport needs to reach a remote location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteDescriptor {
    pub pe: Pe,
    pub key: u32,
    /// Byte offset from the window base.
    pub offset: u64,
}

/// Per-peer registration table, owned by the allocator side of the runtime.
///
/// Read-only from a context's point of view; implementations must allow
/// concurrent lookups.
pub trait WindowTable: Send + Sync {
    fn n_pes(&self) -> u32;

    /// Resolve `len` bytes at `addr` on `pe`. Fails if `pe` is outside the job
    /// or the range was never registered.
    fn resolve(&self, addr: SymAddr, len: usize, pe: Pe) -> Result<RemoteDescriptor>;
}

/// Window table fixed at bootstrap.
#[derive(Debug, Clone)]
pub struct StaticWindowTable {
    windows: Vec<Vec<RemoteWindow>>,
}

impl StaticWindowTable {
    pub fn new(n_pes: u32) -> Self {
        Self {
            windows: vec![Vec::new(); n_pes as usize],
        }
    }

    pub fn register(&mut self, window: RemoteWindow) -> Result<()> {
        let n_pes = self.windows.len() as u32;
        let slot = self
            .windows
            .get_mut(window.pe as usize)
            .ok_or(ShmemError::InvalidPe {
                pe: window.pe,
                n_pes,
            })?;
        slot.push(window);
        Ok(())
    }
}

impl WindowTable for StaticWindowTable {
    fn n_pes(&self) -> u32 {
        self.windows.len() as u32
    }

    fn resolve(&self, addr: SymAddr, len: usize, pe: Pe) -> Result<RemoteDescriptor> {
        let windows = self
            .windows
            .get(pe as usize)
            .ok_or(ShmemError::InvalidPe {
                pe,
                n_pes: self.n_pes(),
            })?;
        windows
            .iter()
            .find(|w| w.covers(addr, len))
            .map(|w| RemoteDescriptor {
                pe,
                key: w.key,
                offset: addr.as_u64() - w.base.as_u64(),
            })
            .ok_or(ShmemError::Unregistered { addr, len, pe })
    }
}
