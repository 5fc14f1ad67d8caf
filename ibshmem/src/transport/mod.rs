//! The seam between contexts and the RDMA fabric.
//!
//! A context never touches queue pairs directly: it hands [`WorkRequest`]s to
//! a [`Transport`] channel and later reaps [`Completion`]s carrying the same
//! signal. Each context gets its own channel from a [`Fabric`], so contexts
//! never steal each other's completions.

pub mod loopback;

use std::sync::Arc;

use crate::error::Result;
use crate::types::{OpKind, Pe};
use crate::window::RemoteDescriptor;

pub use loopback::{LoopbackFabric, LoopbackTransport};

/// Identifies a work request in the completion stream.
pub type Signal = u64;

/// The remote action of one work request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOp {
    /// RDMA write of bytes staged at submission.
    Write { payload: Vec<u8> },
    /// RDMA read of `len` bytes into local memory at `local`.
    Read { local: u64, len: usize },
    /// Atomic wrapping add; completes with the previous value.
    FetchAdd { width: usize, value: u64 },
    /// Atomic compare-and-swap; completes with the previous value.
    CompareSwap { width: usize, cond: u64, value: u64 },
    /// Atomic exchange; completes with the previous value.
    Swap { width: usize, value: u64 },
}

impl WorkOp {
    pub fn kind(&self) -> OpKind {
        match self {
            WorkOp::Write { .. } => OpKind::Put,
            WorkOp::Read { .. } => OpKind::Get,
            WorkOp::FetchAdd { .. } | WorkOp::CompareSwap { .. } | WorkOp::Swap { .. } => {
                OpKind::Atomic
            }
        }
    }

    /// Bytes touched at the remote side.
    pub fn remote_len(&self) -> usize {
        match self {
            WorkOp::Write { payload } => payload.len(),
            WorkOp::Read { len, .. } => *len,
            WorkOp::FetchAdd { width, .. }
            | WorkOp::CompareSwap { width, .. }
            | WorkOp::Swap { width, .. } => *width,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkRequest {
    pub signal: Signal,
    pub remote: RemoteDescriptor,
    pub op: WorkOp,
}

/// Why the fabric failed a work request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WcError {
    #[error("remote access error (key {key:#x})")]
    RemoteAccess { key: u32 },
    #[error("remote operation error: {0}")]
    RemoteOperation(String),
    #[error("work request flushed")]
    Flushed,
}

/// Resolution of one work request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub signal: Signal,
    /// Previous remote value for atomics, zero otherwise.
    pub result: std::result::Result<u64, WcError>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The send queue is full; retry after reaping completions.
    #[error("send queue full")]
    QueueFull,
    #[error("transport channel closed")]
    Closed,
    #[error("work request rejected: {0}")]
    Rejected(String),
}

/// One queue-pair set plus its completion queue.
///
/// Implementations must be callable from several threads at once when the
/// owning context is shared.
pub trait Transport: Send + Sync {
    /// Post a work request. The descriptor is copied into the send queue, so
    /// a caller may resubmit the same request after [`SubmitError::QueueFull`].
    ///
    /// # Safety
    /// For [`WorkOp::Read`], `local` must stay valid for writes of `len` bytes,
    /// and must not be accessed by anyone else, until the completion carrying
    /// this request's signal has been reaped.
    unsafe fn submit(&self, wr: &WorkRequest) -> std::result::Result<(), SubmitError>;

    /// Reap up to `max` completions.
    fn poll_completions(&self, max: usize) -> Vec<Completion>;

    /// Whether requests are delivered in submission order per destination.
    fn ordered_delivery(&self) -> bool;

    fn supports_atomic_width(&self, width: usize) -> bool;
}

/// Hands out transport channels, one per context.
pub trait Fabric: Send + Sync {
    fn open_channel(&self, owner: Pe) -> Result<Arc<dyn Transport>>;
}
