use super::psync::{Rendezvous, check_sync_array};
use super::{ActiveSet, REDUCE_SYNC_SIZE, Team, reduce_wrk_len};
use crate::context::Context;
use crate::error::{Result, ShmemError};
use crate::hash::fnv1a_signature;
use crate::reduce::{Reducible, check_op, reduce_into};
use crate::types::{ReduceOp, SymAddr};

impl Context {
    /// Element-wise reduction of `source` over a PE range, replicated into
    /// `dest` on every participant. `dest` may equal `source`.
    ///
    /// `p_wrk` must hold at least [`reduce_wrk_len`]`(nreduce)` elements.
    #[allow(clippy::too_many_arguments)]
    pub fn to_all<T: Reducible>(
        &self,
        op: ReduceOp,
        dest: SymAddr,
        source: SymAddr,
        nreduce: usize,
        pe_start: u32,
        log_pe_stride: u32,
        pe_size: u32,
        p_wrk: SymAddr,
        p_sync: SymAddr,
    ) -> Result<()> {
        self.run("to_all", || {
            let set =
                ActiveSet::from_range(pe_start, log_pe_stride, pe_size, self.my_pe(), self.n_pes())?;
            check_sync_array(self, p_sync, REDUCE_SYNC_SIZE)?;
            if !p_wrk.is_aligned(T::WIDTH) {
                return Err(ShmemError::Misaligned {
                    addr: p_wrk,
                    align: T::WIDTH,
                });
            }
            let st = self.state();
            st.windows
                .resolve(p_wrk, reduce_wrk_len(nreduce) * T::WIDTH, st.pe)?;
            self.reduce_in::<T>(&set, p_sync, op, dest, source, nreduce)
        })
    }

    pub fn to_all_team<T: Reducible>(
        &self,
        team: &Team,
        op: ReduceOp,
        dest: SymAddr,
        source: SymAddr,
        nreduce: usize,
    ) -> Result<()> {
        self.run("to_all_team", || {
            let set = ActiveSet::from_team(team, self.my_pe())?;
            self.reduce_in::<T>(&set, team.sync(), op, dest, source, nreduce)
        })
    }

    /// Every participant pulls every source and folds them in ordinal order,
    /// so floating point results are identical on all PEs and across runs.
    fn reduce_in<T: Reducible>(
        &self,
        set: &ActiveSet,
        sync: SymAddr,
        op: ReduceOp,
        dest: SymAddr,
        source: SymAddr,
        nreduce: usize,
    ) -> Result<()> {
        check_op::<T>(op)?;
        let st = self.state();
        for addr in [dest, source] {
            if !addr.is_aligned(T::WIDTH) {
                return Err(ShmemError::Misaligned {
                    addr,
                    align: T::WIDTH,
                });
            }
            st.windows.resolve(addr, nreduce * T::WIDTH, st.pe)?;
        }

        let signature = fnv1a_signature([
            b"to_all".as_slice(),
            &set.fingerprint(),
            &(nreduce as u64).to_le_bytes(),
            &[T::DTYPE as u8, op as u8],
        ]);
        let rv = Rendezvous::new(self, set, sync, 0, signature, "to_all");

        // Every source is ready.
        rv.barrier()?;
        let mut acc = vec![T::from_bits(0); nreduce];
        if nreduce > 0 {
            self.get(&mut acc, source, set.pe(0))?;
            let mut incoming = acc.clone();
            for &pe in &set.members()[1..] {
                self.get(&mut incoming, source, pe)?;
                reduce_into(&mut acc, &incoming, op)?;
            }
        }
        // Nobody reads a source any more, so `dest == source` is safe to write.
        rv.barrier()?;
        st.heap.write_slice(dest, &acc)
    }
}
