use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::ActiveSet;
use super::psync::Rendezvous;
use crate::context::Context;
use crate::error::{Result, ShmemError};
use crate::hash::fnv1a_signature;
use crate::types::{Pe, ReduceOp, SymAddr};

/// An ordered subset of the job's PEs, as seen from one member.
///
/// Cheap to clone. Each team owns a sync array in the reserved part of the
/// symmetric heap, at the same address on every member.
#[derive(Clone)]
pub struct Team {
    inner: Arc<TeamInner>,
}

struct TeamInner {
    owner: Pe,
    members: Vec<Pe>,
    my_index: usize,
    slot: usize,
    sync: SymAddr,
}

impl Team {
    pub(crate) fn new(owner: Pe, members: Vec<Pe>, slot: usize, sync: SymAddr) -> Result<Self> {
        let my_index = members
            .iter()
            .position(|&pe| pe == owner)
            .ok_or_else(|| ShmemError::InvalidActiveSet {
                reason: format!("PE {owner} is not a member of the team"),
            })?;
        Ok(Self {
            inner: Arc::new(TeamInner {
                owner,
                members,
                my_index,
                slot,
                sync,
            }),
        })
    }

    pub fn n_pes(&self) -> u32 {
        self.inner.members.len() as u32
    }

    /// The owner's index within the team.
    pub fn my_pe(&self) -> u32 {
        self.inner.my_index as u32
    }

    /// Job-wide PE number of the team member at `index`.
    pub fn translate_pe(&self, index: u32) -> Option<Pe> {
        self.inner.members.get(index as usize).copied()
    }

    pub fn members(&self) -> &[Pe] {
        &self.inner.members
    }

    pub(crate) fn owner(&self) -> Pe {
        self.inner.owner
    }

    pub(crate) fn sync(&self) -> SymAddr {
        self.inner.sync
    }
}

impl std::fmt::Debug for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Team")
            .field("owner", &self.inner.owner)
            .field("members", &self.inner.members)
            .field("slot", &self.inner.slot)
            .finish()
    }
}

impl Context {
    /// Rendezvous of every member of `team`.
    pub fn sync_team(&self, team: &Team) -> Result<()> {
        self.run("sync_team", || {
            let set = ActiveSet::from_team(team, self.my_pe())?;
            let signature = fnv1a_signature([b"sync".as_slice(), &set.fingerprint()]);
            Rendezvous::new(self, &set, team.sync(), 0, signature, "sync_team").barrier()
        })
    }

    /// Collective over `parent`: members `start, start + stride, ...` (team
    /// indices, `size` of them) form a new team. Every parent member must
    /// call; members left out get `None`.
    pub(crate) fn split_strided(
        &self,
        parent: &Team,
        start: u32,
        stride: u32,
        size: u32,
    ) -> Result<Option<Team>> {
        let n = parent.n_pes();
        let last = size
            .checked_sub(1)
            .and_then(|k| k.checked_mul(stride))
            .and_then(|span| span.checked_add(start));
        match last {
            Some(last) if last < n && (stride > 0 || size == 1) => {}
            _ => {
                return Err(ShmemError::InvalidActiveSet {
                    reason: format!(
                        "split start {start} stride {stride} size {size} of a {n}-PE team"
                    ),
                });
            }
        }
        let members: Vec<Pe> = (0..size)
            .map(|i| parent.members()[(start + i * stride) as usize])
            .collect();

        // Agree on a slot no participant has handed out yet.
        let st = self.state();
        let scratch = st.layout.split_scratch();
        let candidate = st.next_team_slot.load(Ordering::Acquire) as u64;
        st.heap.write::<u64>(scratch, candidate)?;
        self.to_all_team::<u64>(parent, ReduceOp::Max, scratch, scratch, 1)?;
        let slot = st.heap.read::<u64>(scratch)? as usize;
        if slot >= st.layout.max_teams() {
            return Err(ShmemError::OutOfMemory {
                requested: 1,
                available: 0,
            });
        }
        st.next_team_slot.fetch_max(slot + 1, Ordering::AcqRel);
        tracing::debug!(pe = st.pe, slot, members = ?members, "team split");

        if members.contains(&st.pe) {
            Team::new(st.pe, members, slot, st.layout.team_sync(slot)).map(Some)
        } else {
            Ok(None)
        }
    }
}
