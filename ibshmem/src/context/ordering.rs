//! `fence`, `quiet` and the job-wide rendezvous.

use std::sync::atomic::Ordering;

use super::Context;
use crate::collective::ceil_log2;
use crate::error::Result;
use crate::types::{Cmp, Pe};
use crate::wait::{Poller, Predicate};

impl Context {
    /// Order earlier puts and atomics on this context before later ones to
    /// the same destination.
    ///
    /// Free on fabrics that deliver in submission order; otherwise a full
    /// `quiet`.
    pub fn fence(&self) -> Result<()> {
        self.run("fence", || self.order_puts())
    }

    /// Fence body, reported under the caller's operation name.
    pub(crate) fn order_puts(&self) -> Result<()> {
        self.check_thread()?;
        if self.ordered_delivery() {
            match self.tracker.failure()? {
                Some(e) => Err(e),
                None => Ok(()),
            }
        } else {
            self.drain()
        }
    }

    /// Block until every operation issued on this context before the call has
    /// completed. Safe to call from several threads at once.
    pub fn quiet(&self) -> Result<()> {
        self.run("quiet", || {
            self.check_thread()?;
            self.drain()
        })
    }

    /// `quiet`, then wait for every PE of the job.
    pub fn barrier_all(&self) -> Result<()> {
        self.run("barrier_all", || {
            self.check_thread()?;
            self.drain()?;
            self.rendezvous_all()
        })
    }

    /// Wait for every PE of the job without draining this context.
    pub fn sync_all(&self) -> Result<()> {
        self.run("sync_all", || {
            self.check_thread()?;
            self.rendezvous_all()
        })
    }

    /// Dissemination barrier over the reserved barrier slots.
    ///
    /// Round `k` signals PE `me + 2^k` and waits for PE `me - 2^k` (mod n).
    /// Slots only ever grow, so a fast PE signalling the next epoch early
    /// still satisfies a slower peer's `>=` wait.
    fn rendezvous_all(&self) -> Result<()> {
        let st = self.state();
        let n = st.n_pes;
        let epoch = st.barrier_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let me = st.pe;
        let poller = Poller::new(&st.config, &st.job);
        for k in 0..ceil_log2(n) {
            let dist = 1u32 << k;
            let to: Pe = (me + dist) % n;
            let from: Pe = (me + n - dist % n) % n;
            self.put_sync_word(st.layout.barrier_slot(me), epoch, to)?;
            let slot = st.layout.barrier_slot(from);
            let pred = Predicate::single(slot, Cmp::Ge, epoch)?;
            poller.all(&*st.heap, &pred)?;
        }
        tracing::trace!(pe = me, epoch, "barrier complete");
        Ok(())
    }
}
