use super::psync::{Rendezvous, check_sync_array};
use super::{ActiveSet, BCAST_SYNC_SIZE, Team};
use crate::context::Context;
use crate::error::{Result, ShmemError};
use crate::hash::fnv1a_signature;
use crate::scalar::Scalar;
use crate::types::SymAddr;

impl Context {
    /// Copy `nelems` elements at `source` on the root into `dest` on every
    /// other PE of the range. `pe_root` is the root's ordinal in the range.
    /// The root's own `dest` is left untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn broadcast<T: Scalar>(
        &self,
        dest: SymAddr,
        source: SymAddr,
        nelems: usize,
        pe_root: u32,
        pe_start: u32,
        log_pe_stride: u32,
        pe_size: u32,
        p_sync: SymAddr,
    ) -> Result<()> {
        self.run("broadcast", || {
            let set =
                ActiveSet::from_range(pe_start, log_pe_stride, pe_size, self.my_pe(), self.n_pes())?;
            check_sync_array(self, p_sync, BCAST_SYNC_SIZE)?;
            self.broadcast_in::<T>(&set, p_sync, dest, source, nelems, pe_root, false)
        })
    }

    /// Team broadcast; `pe_root` is a team index. Also fills the root's `dest`.
    pub fn broadcast_team<T: Scalar>(
        &self,
        team: &Team,
        dest: SymAddr,
        source: SymAddr,
        nelems: usize,
        pe_root: u32,
    ) -> Result<()> {
        self.run("broadcast_team", || {
            let set = ActiveSet::from_team(team, self.my_pe())?;
            self.broadcast_in::<T>(&set, team.sync(), dest, source, nelems, pe_root, true)
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn broadcast_in<T: Scalar>(
        &self,
        set: &ActiveSet,
        sync: SymAddr,
        dest: SymAddr,
        source: SymAddr,
        nelems: usize,
        pe_root: u32,
        to_root: bool,
    ) -> Result<()> {
        let root = pe_root as usize;
        if root >= set.len() {
            return Err(ShmemError::InvalidActiveSet {
                reason: format!("root {root} outside a set of {} PEs", set.len()),
            });
        }
        let nbytes = nelems * T::WIDTH;
        let st = self.state();
        for addr in [dest, source] {
            if !addr.is_aligned(T::WIDTH) {
                return Err(ShmemError::Misaligned {
                    addr,
                    align: T::WIDTH,
                });
            }
            st.windows.resolve(addr, nbytes, st.pe)?;
        }

        let signature = fnv1a_signature([
            b"broadcast".as_slice(),
            &set.fingerprint(),
            &(nelems as u64).to_le_bytes(),
            &[T::DTYPE as u8],
            &pe_root.to_le_bytes(),
        ]);
        // Ordinal 0 checks the parameters, so a disagreement on the root
        // cannot split the set between two leaders.
        let rv = Rendezvous::new(self, set, sync, 0, signature, "broadcast");
        rv.barrier()?;
        if set.me() == root && nbytes > 0 {
            let mut payload = vec![0u8; nbytes];
            st.heap.read_bytes(source, &mut payload)?;
            for (ordinal, &pe) in set.members().iter().enumerate() {
                if ordinal != root || to_root {
                    self.putmem_nbi(dest, &payload, pe)?;
                }
            }
            self.quiet()?;
        }
        // Members leave only after the payload has landed.
        rv.barrier()
    }
}
