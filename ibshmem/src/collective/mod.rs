//! Collective engine: broadcast, reductions and team rendezvous.
//!
//! Legacy PE-range calls and team calls resolve to one [`ActiveSet`] and run
//! the same code. Synchronization goes through a three-word sync array (see
//! [`psync`]) that every participant leaves zeroed on return, so the same
//! array can serve back-to-back collectives.

mod active_set;
mod broadcast;
mod psync;
mod team;
mod to_all;

pub(crate) use active_set::ActiveSet;
pub use team::Team;

/// `i64` words in a broadcast sync array.
pub const BCAST_SYNC_SIZE: usize = 3;

/// `i64` words in a reduction sync array.
pub const REDUCE_SYNC_SIZE: usize = 3;

/// `i64` words in a team or range barrier sync array.
pub const BARRIER_SYNC_SIZE: usize = 3;

/// Value every sync array word must hold before first use.
pub const SYNC_VALUE: i64 = 0;

/// Lower bound on the element count of a legacy reduction work array.
pub const REDUCE_MIN_WRKDATA_SIZE: usize = 1024;

/// Integer ceiling of log2(n). Returns 0 for n <= 1.
pub(crate) fn ceil_log2(n: u32) -> u32 {
    if n <= 1 {
        return 0;
    }
    u32::BITS - (n - 1).leading_zeros()
}

/// Minimum element count of a legacy `p_wrk` array for `nreduce` elements.
pub fn reduce_wrk_len(nreduce: usize) -> usize {
    (nreduce / 2 + 1).max(REDUCE_MIN_WRKDATA_SIZE)
}
