//! Communication contexts.
//!
//! A [`Context`] is one ordered stream of one-sided operations issued by a PE.
//! It owns a transport channel and a completion tracker; `fence` and `quiet`
//! act on the operations of that context only.

mod amo;
mod ordering;
mod rma;
mod tracker;

use std::sync::Arc;
use std::thread::ThreadId;

use crate::backoff::Backoff;
use crate::error::{Result, ShmemError};
use crate::host::PeState;
use crate::transport::{Signal, SubmitError, Transport, WorkOp, WorkRequest};
use crate::types::{Pe, SymAddr};

use tracker::{CompletionTracker, Pending, TicketState};

/// Creation options for a [`Context`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ContextOptions(u32);

impl ContextOptions {
    pub const NONE: Self = Self(0);
    /// The caller promises the context is never used by two threads at once.
    pub const SERIALIZED: Self = Self(1 << 0);
    /// Only the creating thread may use the context.
    pub const PRIVATE: Self = Self(1 << 1);
    /// No puts or atomics will be issued on the context.
    pub const NOSTORE: Self = Self(1 << 2);

    const ALL: u32 = Self::SERIALIZED.0 | Self::PRIVATE.0 | Self::NOSTORE.0;

    /// Convert legacy integer option flags.
    pub fn from_bits(bits: i64) -> Result<Self> {
        if bits < 0 || bits & !(Self::ALL as i64) != 0 {
            return Err(ShmemError::InvalidOptions(bits));
        }
        Ok(Self(bits as u32))
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ContextOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One communication stream of a PE.
pub struct Context {
    id: u64,
    options: ContextOptions,
    owner: ThreadId,
    state: Arc<PeState>,
    transport: Arc<dyn Transport>,
    tracker: CompletionTracker,
}

impl Context {
    pub(crate) fn open(state: Arc<PeState>, options: ContextOptions) -> Result<Self> {
        let transport = state.fabric.open_channel(state.pe)?;
        let id = state.next_context_id();
        tracing::debug!(pe = state.pe, ctx = id, options = options.bits(), "context created");
        Ok(Self {
            id,
            options,
            owner: std::thread::current().id(),
            state,
            transport,
            tracker: CompletionTracker::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn options(&self) -> ContextOptions {
        self.options
    }

    pub fn my_pe(&self) -> Pe {
        self.state.pe
    }

    pub fn n_pes(&self) -> u32 {
        self.state.n_pes
    }

    /// A transport failure was observed; the context accepts no more work.
    pub fn is_failed(&self) -> bool {
        matches!(self.tracker.failure(), Ok(Some(_)) | Err(_))
    }

    /// Operations submitted and not yet completed.
    pub fn outstanding(&self) -> Result<usize> {
        self.tracker.outstanding()
    }

    /// Operations retired so far, successfully or not.
    pub fn completed(&self) -> Result<u64> {
        self.tracker.retired()
    }

    /// Drain every outstanding operation, then release the channel.
    pub fn destroy(self) -> Result<()> {
        let res = self.drain();
        tracing::debug!(pe = self.state.pe, ctx = self.id, ok = res.is_ok(), "context destroyed");
        res
    }

    pub(crate) fn state(&self) -> &PeState {
        &self.state
    }

    /// Pass `result` through, aborting the job if it is a contract violation.
    pub(crate) fn run<T>(&self, op: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.state.job.escalate(self.state.pe, op, f())
    }

    fn check_thread(&self) -> Result<()> {
        if self.options.contains(ContextOptions::PRIVATE)
            && std::thread::current().id() != self.owner
        {
            return Err(ShmemError::ContextMisuse(
                "private context used from a thread other than its creator",
            ));
        }
        Ok(())
    }

    /// Gate for issuing a new operation.
    pub(crate) fn check_usable(&self, stores: bool) -> Result<()> {
        self.state.job.check()?;
        self.check_thread()?;
        if stores && self.options.contains(ContextOptions::NOSTORE) {
            return Err(ShmemError::ContextMisuse("store issued on a NOSTORE context"));
        }
        if self.tracker.failure()?.is_some() {
            return Err(ShmemError::ContextFailed(self.id));
        }
        Ok(())
    }

    pub(crate) fn check_pe(&self, pe: Pe) -> Result<()> {
        if pe >= self.state.n_pes {
            return Err(ShmemError::InvalidPe {
                pe,
                n_pes: self.state.n_pes,
            });
        }
        Ok(())
    }

    /// Resolve, track and submit one work request, retrying while the send
    /// queue is full.
    ///
    /// # Safety
    /// A [`WorkOp::Read`] must name local memory that stays valid and
    /// untouched until its completion has been reaped.
    pub(crate) unsafe fn post(
        &self,
        dest: SymAddr,
        pe: Pe,
        op: WorkOp,
        awaited: bool,
    ) -> Result<Signal> {
        let remote = self.state.windows.resolve(dest, op.remote_len(), pe)?;
        let signal = self.tracker.issue(Pending {
            kind: op.kind(),
            pe,
            dest,
            awaited,
        })?;
        let wr = WorkRequest { signal, remote, op };
        let mut backoff = Backoff::new(&self.state.config);
        let mut retries = 0u64;
        loop {
            // SAFETY: forwarded from the caller.
            match unsafe { self.transport.submit(&wr) } {
                Ok(()) => {
                    if retries > 0 {
                        tracing::trace!(pe = self.state.pe, ctx = self.id, retries, "send queue drained");
                    }
                    return Ok(signal);
                }
                Err(SubmitError::QueueFull) => {
                    retries += 1;
                    if self.progress()? > 0 {
                        backoff.reset();
                    } else {
                        backoff.snooze();
                    }
                }
                Err(e) => {
                    tracing::error!(
                        pe = self.state.pe,
                        ctx = self.id,
                        target = pe,
                        dest = %dest,
                        error = %e,
                        "submission failed"
                    );
                    return Err(self.tracker.retract(signal, e.to_string())?);
                }
            }
        }
    }

    /// Reap one batch of completions. Returns how many were retired.
    pub(crate) fn progress(&self) -> Result<usize> {
        let batch = self.transport.poll_completions(self.state.config.poll_batch);
        let n = batch.len();
        for c in batch {
            self.tracker.complete(c)?;
        }
        Ok(n)
    }

    /// Block until `signal` completes, returning its completion value.
    ///
    /// Completions always arrive, so this does not watch the job abort flag:
    /// returning early would hand memory back while the fabric may still
    /// write it.
    pub(crate) fn wait_signal(&self, signal: Signal) -> Result<u64> {
        let mut backoff = Backoff::new(&self.state.config);
        loop {
            match self.tracker.take(signal)? {
                TicketState::Done(v) => return Ok(v),
                TicketState::Failed(e) => return Err(e),
                TicketState::Pending => {
                    if self.progress()? > 0 {
                        backoff.reset();
                    } else {
                        backoff.snooze();
                    }
                }
            }
        }
    }

    /// Wait for everything issued before the call, then report any failure.
    pub(crate) fn drain(&self) -> Result<()> {
        let horizon = self.tracker.horizon()?;
        let mut backoff = Backoff::new(&self.state.config);
        while !self.tracker.drained_below(horizon)? {
            if self.progress()? > 0 {
                backoff.reset();
            } else {
                backoff.snooze();
            }
        }
        match self.tracker.failure()? {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub(crate) fn ordered_delivery(&self) -> bool {
        self.transport.ordered_delivery()
    }

    pub(crate) fn supports_atomic_width(&self, width: usize) -> bool {
        self.transport.supports_atomic_width(width)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if matches!(self.tracker.outstanding(), Ok(n) if n > 0)
            && let Err(e) = self.drain()
        {
            tracing::warn!(pe = self.state.pe, ctx = self.id, error = %e, "context dropped after failure");
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("pe", &self.state.pe)
            .field("options", &self.options)
            .finish()
    }
}
