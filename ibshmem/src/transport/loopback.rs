//! In-process fabric: every PE's heap lives in this process and each channel
//! is served by a progress task that plays the part of the NIC.
//!
//! A channel has a bounded send queue and completion queue. The progress task
//! drains the send queue in FIFO order, so requests reach every destination in
//! submission order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crossbeam_queue::ArrayQueue;
use tokio::sync::Notify;

use super::{Completion, Fabric, SubmitError, Transport, WcError, WorkOp, WorkRequest};
use crate::config::ShmemConfig;
use crate::error::{Result, ShmemError};
use crate::heap::SymmetricHeap;
use crate::types::{Pe, SymAddr};
use crate::window::{RemoteWindow, StaticWindowTable};

/// Worker threads driving channel progress tasks.
const PROGRESS_THREADS: usize = 2;

/// Remote keys are derived from the PE so a stale key is easy to spot in logs.
const KEY_BASE: u32 = 0x5eed_0000;

/// Registered memory of every PE, shared by all channels.
struct Registry {
    heaps: Vec<Arc<SymmetricHeap>>,
    keys: Vec<AtomicU32>,
}

impl Registry {
    fn execute(&self, wr: WorkRequest) -> Completion {
        let signal = wr.signal;
        Completion {
            signal,
            result: self.apply(wr),
        }
    }

    fn apply(&self, wr: WorkRequest) -> std::result::Result<u64, WcError> {
        let remote = wr.remote;
        let (Some(heap), Some(key)) = (
            self.heaps.get(remote.pe as usize),
            self.keys.get(remote.pe as usize),
        ) else {
            return Err(WcError::RemoteAccess { key: remote.key });
        };
        if key.load(Ordering::Acquire) != remote.key {
            return Err(WcError::RemoteAccess { key: remote.key });
        }
        let addr = SymAddr::new(remote.offset);
        let outcome = match wr.op {
            WorkOp::Write { payload } => heap.write_bytes(addr, &payload).map(|_| 0),
            WorkOp::Read { local, len } => {
                // SAFETY: the submitter guarantees `local` is valid for `len`
                // bytes and untouched until this completion is reaped.
                let dst = unsafe { std::slice::from_raw_parts_mut(local as *mut u8, len) };
                heap.read_bytes(addr, dst).map(|_| 0)
            }
            WorkOp::FetchAdd { width, value } => heap.fetch_add_bits(addr, width, value),
            WorkOp::CompareSwap { width, cond, value } => {
                heap.compare_swap_bits(addr, width, cond, value)
            }
            WorkOp::Swap { width, value } => heap.swap_bits(addr, width, value),
        };
        outcome.map_err(|e| WcError::RemoteOperation(e.to_string()))
    }
}

/// Fabric connecting the heaps of every PE in this process.
pub struct LoopbackFabric {
    registry: Arc<Registry>,
    runtime: tokio::runtime::Runtime,
    queue_depth: usize,
    channels_opened: AtomicU64,
}

impl LoopbackFabric {
    /// Allocate and register a zeroed heap of `config.heap_size` bytes per PE.
    pub fn new(n_pes: u32, config: &ShmemConfig) -> Result<Arc<Self>> {
        if n_pes == 0 {
            return Err(ShmemError::InvalidActiveSet {
                reason: "a job needs at least one PE".into(),
            });
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(PROGRESS_THREADS)
            .thread_name("ibshmem-progress")
            .build()
            .map_err(|e| ShmemError::transport_with_source("loopback progress runtime", e))?;
        let heaps = (0..n_pes)
            .map(|pe| Arc::new(SymmetricHeap::new(pe, config.heap_size)))
            .collect();
        let keys = (0..n_pes).map(|pe| AtomicU32::new(KEY_BASE | pe)).collect();
        tracing::debug!(n_pes, heap_size = config.heap_size, "loopback fabric up");
        Ok(Arc::new(Self {
            registry: Arc::new(Registry { heaps, keys }),
            runtime,
            queue_depth: config.queue_depth.max(1),
            channels_opened: AtomicU64::new(0),
        }))
    }

    pub fn n_pes(&self) -> u32 {
        self.registry.heaps.len() as u32
    }

    /// The local heap of `pe`.
    pub fn heap(&self, pe: Pe) -> Result<Arc<SymmetricHeap>> {
        self.registry
            .heaps
            .get(pe as usize)
            .cloned()
            .ok_or(ShmemError::InvalidPe {
                pe,
                n_pes: self.n_pes(),
            })
    }

    /// Window table covering every PE's whole heap with its current key.
    pub fn window_table(&self) -> Result<StaticWindowTable> {
        let mut table = StaticWindowTable::new(self.n_pes());
        for (pe, heap) in self.registry.heaps.iter().enumerate() {
            table.register(RemoteWindow {
                pe: pe as Pe,
                base: SymAddr::new(0),
                key: self.registry.keys[pe].load(Ordering::Acquire),
                len: heap.len(),
            })?;
        }
        Ok(table)
    }

    /// Invalidate the remote key of `pe`. Every later access to its heap
    /// completes with a remote access error, as after a deregistration.
    pub fn revoke(&self, pe: Pe) -> Result<()> {
        let key = self.registry.keys.get(pe as usize).ok_or(ShmemError::InvalidPe {
            pe,
            n_pes: self.n_pes(),
        })?;
        key.store(0, Ordering::Release);
        tracing::warn!(pe, "loopback: remote key revoked");
        Ok(())
    }

    pub fn channels_opened(&self) -> u64 {
        self.channels_opened.load(Ordering::Relaxed)
    }
}

impl Fabric for LoopbackFabric {
    fn open_channel(&self, owner: Pe) -> Result<Arc<dyn Transport>> {
        if owner >= self.n_pes() {
            return Err(ShmemError::InvalidPe {
                pe: owner,
                n_pes: self.n_pes(),
            });
        }
        let channel = Arc::new(Channel {
            owner,
            sq: ArrayQueue::new(self.queue_depth),
            cq: ArrayQueue::new(self.queue_depth),
            in_flight: AtomicUsize::new(0),
            doorbell: Notify::new(),
            closed: AtomicBool::new(false),
            registry: Arc::clone(&self.registry),
        });
        self.runtime.spawn(progress_loop(Arc::clone(&channel)));
        self.channels_opened.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(LoopbackTransport {
            channel,
            depth: self.queue_depth,
        }))
    }
}

impl std::fmt::Debug for LoopbackFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackFabric")
            .field("n_pes", &self.n_pes())
            .field("queue_depth", &self.queue_depth)
            .finish()
    }
}

struct Channel {
    owner: Pe,
    sq: ArrayQueue<WorkRequest>,
    cq: ArrayQueue<Completion>,
    /// Submitted but not yet reaped. Bounds both queues.
    in_flight: AtomicUsize,
    doorbell: Notify,
    closed: AtomicBool,
    registry: Arc<Registry>,
}

/// Drain the send queue until the channel is closed.
async fn progress_loop(channel: Arc<Channel>) {
    loop {
        while let Some(wr) = channel.sq.pop() {
            let completion = channel.registry.execute(wr);
            if let Err(c) = channel.cq.push(completion) {
                // Cannot happen while `in_flight` bounds the queue.
                tracing::error!(
                    pe = channel.owner,
                    signal = c.signal,
                    "loopback: completion queue overrun"
                );
            }
        }
        if channel.closed.load(Ordering::Acquire) {
            break;
        }
        channel.doorbell.notified().await;
    }
    tracing::trace!(pe = channel.owner, "loopback: progress loop ended");
}

/// One context's view of the loopback fabric.
pub struct LoopbackTransport {
    channel: Arc<Channel>,
    depth: usize,
}

impl Transport for LoopbackTransport {
    unsafe fn submit(&self, wr: &WorkRequest) -> std::result::Result<(), SubmitError> {
        if self.channel.closed.load(Ordering::Acquire) {
            return Err(SubmitError::Closed);
        }
        if let WorkOp::Write { payload } = &wr.op
            && payload.is_empty()
        {
            return Err(SubmitError::Rejected("zero-length write".into()));
        }
        if self.channel.in_flight.fetch_add(1, Ordering::AcqRel) >= self.depth {
            self.channel.in_flight.fetch_sub(1, Ordering::AcqRel);
            return Err(SubmitError::QueueFull);
        }
        if self.channel.sq.push(wr.clone()).is_err() {
            self.channel.in_flight.fetch_sub(1, Ordering::AcqRel);
            return Err(SubmitError::QueueFull);
        }
        self.channel.doorbell.notify_one();
        Ok(())
    }

    fn poll_completions(&self, max: usize) -> Vec<Completion> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.channel.cq.pop() {
                Some(c) => {
                    self.channel.in_flight.fetch_sub(1, Ordering::AcqRel);
                    out.push(c);
                }
                None => break,
            }
        }
        out
    }

    fn ordered_delivery(&self) -> bool {
        true
    }

    fn supports_atomic_width(&self, width: usize) -> bool {
        matches!(width, 4 | 8)
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.channel.closed.store(true, Ordering::Release);
        self.channel.doorbell.notify_one();
    }
}
