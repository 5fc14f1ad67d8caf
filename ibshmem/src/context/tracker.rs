use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, ShmemError};
use crate::transport::{Completion, Signal};
use crate::types::{OpKind, Pe, SymAddr};

/// An operation submitted but not yet seen on the completion queue.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Pending {
    pub kind: OpKind,
    pub pe: Pe,
    pub dest: SymAddr,
    /// A caller blocks on this ticket and wants its completion value.
    pub awaited: bool,
}

/// First fabric failure seen by a context.
#[derive(Debug, Clone)]
struct Failure {
    kind: OpKind,
    pe: Pe,
    dest: SymAddr,
    reason: String,
}

impl Failure {
    fn to_error(&self) -> ShmemError {
        ShmemError::OperationFailed {
            op: self.kind,
            pe: self.pe,
            dest: self.dest,
            reason: self.reason.clone(),
        }
    }
}

#[derive(Debug)]
pub(crate) enum TicketState {
    Pending,
    Done(u64),
    Failed(ShmemError),
}

#[derive(Debug)]
struct State {
    next: Signal,
    pending: BTreeMap<Signal, Pending>,
    results: HashMap<Signal, u64>,
    failure: Option<Failure>,
    retired: u64,
}

/// Outstanding-operation bookkeeping for one context.
///
/// Tickets are handed out in increasing order, so "everything issued before
/// this point" is just a ticket horizon. The lock is held only for
/// bookkeeping; callers never submit or wait while holding it.
#[derive(Debug)]
pub(crate) struct CompletionTracker {
    state: Mutex<State>,
}

impl CompletionTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next: 1,
                pending: BTreeMap::new(),
                results: HashMap::new(),
                failure: None,
                retired: 0,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ShmemError::LockPoisoned("completion tracker"))
    }

    /// Record an operation about to be submitted and return its signal.
    pub(crate) fn issue(&self, op: Pending) -> Result<Signal> {
        let mut st = self.lock()?;
        let signal = st.next;
        st.next += 1;
        st.pending.insert(signal, op);
        Ok(signal)
    }

    /// The transport refused `signal` outright; it will never complete.
    pub(crate) fn retract(&self, signal: Signal, reason: String) -> Result<ShmemError> {
        let mut st = self.lock()?;
        let op = st.pending.remove(&signal);
        st.retired += 1;
        let failure = match op {
            Some(op) => Failure {
                kind: op.kind,
                pe: op.pe,
                dest: op.dest,
                reason,
            },
            None => return Ok(ShmemError::transport(reason)),
        };
        let err = failure.to_error();
        st.failure.get_or_insert(failure);
        Ok(err)
    }

    pub(crate) fn complete(&self, c: Completion) -> Result<()> {
        let mut st = self.lock()?;
        let Some(op) = st.pending.remove(&c.signal) else {
            tracing::warn!(signal = c.signal, "completion for unknown signal");
            return Ok(());
        };
        st.retired += 1;
        match c.result {
            Ok(value) => {
                if op.awaited {
                    st.results.insert(c.signal, value);
                }
            }
            Err(wc) => {
                tracing::error!(
                    pe = op.pe,
                    op = %op.kind,
                    dest = %op.dest,
                    error = %wc,
                    "work completion failed"
                );
                st.failure.get_or_insert(Failure {
                    kind: op.kind,
                    pe: op.pe,
                    dest: op.dest,
                    reason: wc.to_string(),
                });
            }
        }
        Ok(())
    }

    /// First signal not yet issued.
    pub(crate) fn horizon(&self) -> Result<Signal> {
        Ok(self.lock()?.next)
    }

    /// No operation issued before `horizon` is still outstanding.
    pub(crate) fn drained_below(&self, horizon: Signal) -> Result<bool> {
        Ok(self.lock()?.pending.range(..horizon).next().is_none())
    }

    /// Claim the result of an awaited ticket.
    pub(crate) fn take(&self, signal: Signal) -> Result<TicketState> {
        let mut st = self.lock()?;
        if let Some(v) = st.results.remove(&signal) {
            return Ok(TicketState::Done(v));
        }
        if st.pending.contains_key(&signal) {
            return Ok(TicketState::Pending);
        }
        let err = st
            .failure
            .as_ref()
            .map(Failure::to_error)
            .unwrap_or_else(|| ShmemError::transport(format!("signal {signal} lost")));
        Ok(TicketState::Failed(err))
    }

    pub(crate) fn outstanding(&self) -> Result<usize> {
        Ok(self.lock()?.pending.len())
    }

    pub(crate) fn retired(&self) -> Result<u64> {
        Ok(self.lock()?.retired)
    }

    pub(crate) fn failure(&self) -> Result<Option<ShmemError>> {
        Ok(self.lock()?.failure.as_ref().map(Failure::to_error))
    }
}
