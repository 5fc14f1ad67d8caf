//! Arrive/release rendezvous on a three-word sync array.
//!
//! | word | on the leader         | on a member    |
//! |------|-----------------------|----------------|
//! | 0    | arrival counter       | unused         |
//! | 1    | unused                | release flag   |
//! | 2    | signature accumulator | unused         |
//!
//! Members add their parameter signature and then one arrival to the leader.
//! The leader waits for every arrival, checks that the accumulated signatures
//! match its own, zeroes its words and writes the release flag on every
//! member. A member zeroes its flag after reading it. No member can arrive for
//! the next collective before being released from the current one, so the
//! array is all zero again before it can be reused.

use super::ActiveSet;
use crate::context::Context;
use crate::error::{Result, ShmemError};
use crate::types::{Cmp, SymAddr};
use crate::wait::{Poller, Predicate};

const ARRIVALS: usize = 0;
const RELEASE: usize = 1;
const SIGNATURE: usize = 2;

const RELEASED: u64 = 1;
const MISMATCH: u64 = 2;

/// Reject a caller-provided sync array that is misaligned or unregistered.
pub(crate) fn check_sync_array(ctx: &Context, p_sync: SymAddr, words: usize) -> Result<()> {
    if !p_sync.is_aligned(8) {
        return Err(ShmemError::Misaligned {
            addr: p_sync,
            align: 8,
        });
    }
    let st = ctx.state();
    st.windows.resolve(p_sync, words * 8, st.pe).map(|_| ())
}

pub(crate) struct Rendezvous<'a> {
    ctx: &'a Context,
    set: &'a ActiveSet,
    sync: SymAddr,
    leader: usize,
    signature: u64,
    operation: &'static str,
}

impl<'a> Rendezvous<'a> {
    pub(crate) fn new(
        ctx: &'a Context,
        set: &'a ActiveSet,
        sync: SymAddr,
        leader: usize,
        signature: u64,
        operation: &'static str,
    ) -> Self {
        Self {
            ctx,
            set,
            sync,
            leader,
            signature,
            operation,
        }
    }

    fn word(&self, i: usize) -> SymAddr {
        self.sync.index::<i64>(i)
    }

    fn is_leader(&self) -> bool {
        self.set.me() == self.leader
    }

    fn mismatch(&self) -> ShmemError {
        ShmemError::CollectiveMismatch {
            operation: self.operation,
            leader: self.set.pe(self.leader),
        }
    }

    /// Member side: announce arrival to the leader.
    fn arrive(&self) -> Result<()> {
        let leader = self.set.pe(self.leader);
        self.ctx
            .add_sync_word(self.word(SIGNATURE), self.signature as i64, leader)?;
        // The count must not land before the signature.
        self.ctx.order_puts()?;
        self.ctx.add_sync_word(self.word(ARRIVALS), 1, leader)
    }

    /// Leader side: wait for every member and verify their parameters.
    fn gather(&self) -> Result<()> {
        let st = self.ctx.state();
        let expected = (self.set.len() - 1) as i64;
        if expected > 0 {
            let pred = Predicate::single(self.word(ARRIVALS), Cmp::Ge, expected)?;
            Poller::new(&st.config, &st.job).all(&*st.heap, &pred)?;
        }
        let sum = st.heap.read::<i64>(self.word(SIGNATURE))? as u64;
        st.heap.write::<i64>(self.word(ARRIVALS), 0)?;
        st.heap.write::<i64>(self.word(SIGNATURE), 0)?;
        if sum != self.signature.wrapping_mul(expected as u64) {
            tracing::error!(
                pe = st.pe,
                operation = self.operation,
                "participants disagree on collective parameters"
            );
            self.release_with(MISMATCH)?;
            return Err(self.mismatch());
        }
        Ok(())
    }

    /// Leader side: let every member go.
    fn release(&self) -> Result<()> {
        self.release_with(RELEASED)
    }

    fn release_with(&self, flag: u64) -> Result<()> {
        for (ordinal, &pe) in self.set.members().iter().enumerate() {
            if ordinal != self.leader {
                self.ctx.put_sync_word(self.word(RELEASE), flag, pe)?;
            }
        }
        Ok(())
    }

    /// Member side: wait for the leader's release and reset the flag.
    fn await_release(&self) -> Result<()> {
        let st = self.ctx.state();
        let pred = Predicate::single(self.word(RELEASE), Cmp::Ne, 0i64)?;
        Poller::new(&st.config, &st.job).all(&*st.heap, &pred)?;
        let flag = st.heap.swap_bits(self.word(RELEASE), 8, 0)?;
        if flag == MISMATCH {
            return Err(self.mismatch());
        }
        Ok(())
    }

    /// Plain rendezvous of the whole set.
    pub(crate) fn barrier(&self) -> Result<()> {
        if self.is_leader() {
            self.gather()?;
            self.release()
        } else {
            self.arrive()?;
            self.await_release()
        }
    }
}
