use super::Team;
use crate::error::{Result, ShmemError};
use crate::types::Pe;

/// Ordered participants of one collective call, plus the caller's ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ActiveSet {
    members: Vec<Pe>,
    me: usize,
}

fn invalid(reason: String) -> ShmemError {
    ShmemError::InvalidActiveSet { reason }
}

impl ActiveSet {
    /// Legacy range: `pe_size` PEs starting at `pe_start`, `2^log_pe_stride` apart.
    pub(crate) fn from_range(
        pe_start: u32,
        log_pe_stride: u32,
        pe_size: u32,
        my_pe: Pe,
        n_pes: u32,
    ) -> Result<Self> {
        if pe_size == 0 {
            return Err(invalid("empty PE range".into()));
        }
        let stride = 1u32
            .checked_shl(log_pe_stride)
            .filter(|_| log_pe_stride < u32::BITS - 1)
            .ok_or_else(|| invalid(format!("log_pe_stride {log_pe_stride} too large")))?;
        let last = (pe_size - 1)
            .checked_mul(stride)
            .and_then(|span| span.checked_add(pe_start));
        match last {
            Some(last) if last < n_pes => {}
            _ => {
                return Err(invalid(format!(
                    "range start {pe_start} stride {stride} size {pe_size} exceeds {n_pes} PEs"
                )));
            }
        }
        let members: Vec<Pe> = (0..pe_size).map(|i| pe_start + i * stride).collect();
        Self::with_members(members, my_pe)
    }

    pub(crate) fn from_team(team: &Team, my_pe: Pe) -> Result<Self> {
        if team.owner() != my_pe {
            return Err(invalid(format!(
                "team handle of PE {} used on PE {my_pe}",
                team.owner()
            )));
        }
        Self::with_members(team.members().to_vec(), my_pe)
    }

    fn with_members(members: Vec<Pe>, my_pe: Pe) -> Result<Self> {
        let me = members
            .iter()
            .position(|&pe| pe == my_pe)
            .ok_or_else(|| invalid(format!("PE {my_pe} is not a member")))?;
        Ok(Self { members, me })
    }

    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    /// The caller's ordinal.
    pub(crate) fn me(&self) -> usize {
        self.me
    }

    pub(crate) fn pe(&self, ordinal: usize) -> Pe {
        self.members[ordinal]
    }

    pub(crate) fn members(&self) -> &[Pe] {
        &self.members
    }

    /// Membership as bytes, for parameter signatures.
    pub(crate) fn fingerprint(&self) -> Vec<u8> {
        self.members.iter().flat_map(|pe| pe.to_le_bytes()).collect()
    }
}
