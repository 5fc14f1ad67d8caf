//! Per-PE host handle.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::collective::{BARRIER_SYNC_SIZE, Team};
use crate::config::ShmemConfig;
use crate::context::{Context, ContextOptions};
use crate::error::{Result, ShmemError};
use crate::heap::{SymmetricAllocator, SymmetricHeap};
use crate::job::JobControl;
use crate::scalar::Scalar;
use crate::transport::{Fabric, LoopbackFabric};
use crate::types::{Cmp, Pe, SymAddr};
use crate::wait::{Poller, Predicate, Target};
use crate::window::WindowTable;

/// Alignment of the first user allocation.
const USER_BASE_ALIGN: u64 = 64;

/// Runtime-owned area at the bottom of every symmetric heap.
///
/// `[barrier slot per PE][split scratch word][team sync arrays][user heap...]`
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    split_scratch: SymAddr,
    team_base: SymAddr,
    max_teams: usize,
    user_base: SymAddr,
}

impl Layout {
    fn new(n_pes: u32, max_teams: usize) -> Self {
        let split_scratch = SymAddr::new(0).index::<u64>(n_pes as usize);
        let team_base = split_scratch.index::<u64>(1);
        let team_end = team_base.index::<i64>(max_teams * BARRIER_SYNC_SIZE);
        let user_base = team_end.as_u64().div_ceil(USER_BASE_ALIGN) * USER_BASE_ALIGN;
        Self {
            split_scratch,
            team_base,
            max_teams,
            user_base: SymAddr::new(user_base),
        }
    }

    /// Word written by `pe` during dissemination barriers.
    pub(crate) fn barrier_slot(&self, pe: Pe) -> SymAddr {
        SymAddr::new(0).index::<u64>(pe as usize)
    }

    pub(crate) fn split_scratch(&self) -> SymAddr {
        self.split_scratch
    }

    pub(crate) fn team_sync(&self, slot: usize) -> SymAddr {
        self.team_base.index::<i64>(slot * BARRIER_SYNC_SIZE)
    }

    pub(crate) fn max_teams(&self) -> usize {
        self.max_teams
    }

    pub(crate) fn user_base(&self) -> SymAddr {
        self.user_base
    }
}

/// State shared by a PE's host handle and all of its contexts.
pub(crate) struct PeState {
    pub(crate) pe: Pe,
    pub(crate) n_pes: u32,
    pub(crate) heap: Arc<SymmetricHeap>,
    pub(crate) windows: Arc<dyn WindowTable>,
    pub(crate) fabric: Arc<dyn Fabric>,
    pub(crate) job: Arc<JobControl>,
    pub(crate) config: ShmemConfig,
    pub(crate) layout: Layout,
    /// Advanced in lockstep by every PE, once per job-wide barrier.
    pub(crate) barrier_epoch: AtomicU64,
    /// Lowest team slot this PE has not handed out.
    pub(crate) next_team_slot: AtomicUsize,
    context_ids: AtomicU64,
}

impl PeState {
    pub(crate) fn next_context_id(&self) -> u64 {
        self.context_ids.fetch_add(1, Ordering::Relaxed)
    }
}

/// One processing element's handle on the runtime.
///
/// Owns the PE's default context, which any number of threads may share.
/// Threads wanting their own ordering stream create extra contexts.
pub struct ShmemHost {
    state: Arc<PeState>,
    allocator: Mutex<SymmetricAllocator>,
    world: Team,
    ctx: Context,
}

impl ShmemHost {
    /// Bootstrap `n_pes` PEs in this process over a fresh loopback fabric.
    ///
    /// Returns one handle per PE, ordered by PE number.
    pub fn bootstrap_local(n_pes: u32, config: ShmemConfig) -> Result<Vec<ShmemHost>> {
        let fabric = LoopbackFabric::new(n_pes, &config)?;
        Self::bootstrap_loopback(fabric, config)
    }

    /// Bootstrap every PE of an existing loopback fabric.
    pub fn bootstrap_loopback(
        fabric: Arc<LoopbackFabric>,
        config: ShmemConfig,
    ) -> Result<Vec<ShmemHost>> {
        let n_pes = fabric.n_pes();
        let windows: Arc<dyn WindowTable> = Arc::new(fabric.window_table()?);
        let job = Arc::new(JobControl::new());
        let layout = Layout::new(n_pes, config.max_teams.max(1));

        (0..n_pes)
            .map(|pe| {
                let heap = fabric.heap(pe)?;
                let limit = heap.len() as u64;
                if layout.user_base().as_u64() >= limit {
                    return Err(ShmemError::OutOfMemory {
                        requested: layout.user_base().as_u64() as usize,
                        available: heap.len(),
                    });
                }
                let state = Arc::new(PeState {
                    pe,
                    n_pes,
                    heap,
                    windows: Arc::clone(&windows),
                    fabric: Arc::clone(&fabric) as Arc<dyn Fabric>,
                    job: Arc::clone(&job),
                    config: config.clone(),
                    layout,
                    barrier_epoch: AtomicU64::new(0),
                    next_team_slot: AtomicUsize::new(1),
                    context_ids: AtomicU64::new(0),
                });
                let world = Team::new(pe, (0..n_pes).collect(), 0, layout.team_sync(0))?;
                let ctx = Context::open(Arc::clone(&state), ContextOptions::NONE)?;
                tracing::debug!(pe, n_pes, "PE bootstrapped");
                Ok(ShmemHost {
                    allocator: Mutex::new(SymmetricAllocator::new(layout.user_base(), limit)),
                    state,
                    world,
                    ctx,
                })
            })
            .collect()
    }

    pub fn my_pe(&self) -> Pe {
        self.state.pe
    }

    pub fn n_pes(&self) -> u32 {
        self.state.n_pes
    }

    pub fn config(&self) -> &ShmemConfig {
        &self.state.config
    }

    pub fn job(&self) -> &JobControl {
        &self.state.job
    }

    /// This PE's symmetric heap, for local loads and stores.
    pub fn heap(&self) -> &SymmetricHeap {
        &self.state.heap
    }

    /// The default context, shared by every thread of this PE.
    pub fn ctx(&self) -> &Context {
        &self.ctx
    }

    pub fn create_context(&self, options: ContextOptions) -> Result<Context> {
        Context::open(Arc::clone(&self.state), options)
    }

    /// [`ShmemHost::create_context`] from legacy integer option flags.
    pub fn create_context_from_bits(&self, options: i64) -> Result<Context> {
        self.guard("create_context", || {
            self.create_context(ContextOptions::from_bits(options)?)
        })
    }

    /// Allocate `size` bytes of symmetric memory. Every PE must make the same
    /// sequence of allocations.
    pub fn malloc(&self, size: usize) -> Result<SymAddr> {
        self.malloc_aligned(size, 8)
    }

    pub fn malloc_aligned(&self, size: usize, align: usize) -> Result<SymAddr> {
        let mut alloc = self
            .allocator
            .lock()
            .map_err(|_| ShmemError::LockPoisoned("symmetric allocator"))?;
        alloc.alloc(size, align)
    }

    /// Symmetric room for `n` elements of `T`.
    pub fn malloc_array<T: Scalar>(&self, n: usize) -> Result<SymAddr> {
        self.malloc_aligned(n * T::WIDTH, T::WIDTH)
    }

    pub fn team_world(&self) -> &Team {
        &self.world
    }

    /// Collective over `parent`; see [`Team`].
    pub fn team_split_strided(
        &self,
        parent: &Team,
        start: u32,
        stride: u32,
        size: u32,
    ) -> Result<Option<Team>> {
        self.ctx.run("team_split_strided", || {
            self.ctx.split_strided(parent, start, stride, size)
        })
    }

    /// Decode a legacy comparison code.
    pub fn cmp_from_code(&self, code: i32) -> Result<Cmp> {
        self.guard("cmp_from_code", || Cmp::try_from(code))
    }

    fn guard<T>(&self, op: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.state.job.escalate(self.state.pe, op, f())
    }

    fn poller(&self) -> Poller<'_> {
        Poller::new(&self.state.config, &self.state.job)
    }

    /// Block until the local `ivar` compares `cmp` to `value`.
    pub fn wait_until<T: Scalar>(&self, ivar: SymAddr, cmp: Cmp, value: T) -> Result<()> {
        self.guard("wait_until", || {
            let pred = Predicate::single(ivar, cmp, value)?;
            self.poller().all(self.heap(), &pred)
        })
    }

    /// Block until every active element of `ivars[..nelems]` compares `cmp`
    /// to `value`. A non-zero `status[i]` excludes element `i`.
    pub fn wait_until_all<T: Scalar>(
        &self,
        ivars: SymAddr,
        nelems: usize,
        status: Option<&[i32]>,
        cmp: Cmp,
        value: T,
    ) -> Result<()> {
        self.guard("wait_until_all", || {
            let pred = Predicate::new(ivars, nelems, status, cmp, Target::Same(value))?;
            self.poller().all(self.heap(), &pred)
        })
    }

    /// Block until some active element qualifies and return its index.
    /// `None` when every element is excluded.
    pub fn wait_until_any<T: Scalar>(
        &self,
        ivars: SymAddr,
        nelems: usize,
        status: Option<&[i32]>,
        cmp: Cmp,
        value: T,
    ) -> Result<Option<usize>> {
        self.guard("wait_until_any", || {
            let pred = Predicate::new(ivars, nelems, status, cmp, Target::Same(value))?;
            self.poller().any(self.heap(), &pred)
        })
    }

    /// Block until at least one active element qualifies; write every
    /// qualifying index to `indices` and return how many there are.
    pub fn wait_until_some<T: Scalar>(
        &self,
        ivars: SymAddr,
        nelems: usize,
        indices: &mut [usize],
        status: Option<&[i32]>,
        cmp: Cmp,
        value: T,
    ) -> Result<usize> {
        self.guard("wait_until_some", || {
            let pred = Predicate::new(ivars, nelems, status, cmp, Target::Same(value))?;
            self.poller().some(self.heap(), &pred, indices)
        })
    }

    pub fn wait_until_all_vector<T: Scalar>(
        &self,
        ivars: SymAddr,
        nelems: usize,
        status: Option<&[i32]>,
        cmp: Cmp,
        values: &[T],
    ) -> Result<()> {
        self.guard("wait_until_all_vector", || {
            let pred = Predicate::new(ivars, nelems, status, cmp, Target::Each(values))?;
            self.poller().all(self.heap(), &pred)
        })
    }

    pub fn wait_until_any_vector<T: Scalar>(
        &self,
        ivars: SymAddr,
        nelems: usize,
        status: Option<&[i32]>,
        cmp: Cmp,
        values: &[T],
    ) -> Result<Option<usize>> {
        self.guard("wait_until_any_vector", || {
            let pred = Predicate::new(ivars, nelems, status, cmp, Target::Each(values))?;
            self.poller().any(self.heap(), &pred)
        })
    }

    pub fn wait_until_some_vector<T: Scalar>(
        &self,
        ivars: SymAddr,
        nelems: usize,
        indices: &mut [usize],
        status: Option<&[i32]>,
        cmp: Cmp,
        values: &[T],
    ) -> Result<usize> {
        self.guard("wait_until_some_vector", || {
            let pred = Predicate::new(ivars, nelems, status, cmp, Target::Each(values))?;
            self.poller().some(self.heap(), &pred, indices)
        })
    }

    /// One observation of `ivar`; never blocks.
    pub fn test<T: Scalar>(&self, ivar: SymAddr, cmp: Cmp, value: T) -> Result<bool> {
        self.guard("test", || Predicate::single(ivar, cmp, value)?.all(self.heap()))
    }

    pub fn test_all<T: Scalar>(
        &self,
        ivars: SymAddr,
        nelems: usize,
        status: Option<&[i32]>,
        cmp: Cmp,
        value: T,
    ) -> Result<bool> {
        self.guard("test_all", || {
            Predicate::new(ivars, nelems, status, cmp, Target::Same(value))?.all(self.heap())
        })
    }

    pub fn test_any<T: Scalar>(
        &self,
        ivars: SymAddr,
        nelems: usize,
        status: Option<&[i32]>,
        cmp: Cmp,
        value: T,
    ) -> Result<Option<usize>> {
        self.guard("test_any", || {
            Predicate::new(ivars, nelems, status, cmp, Target::Same(value))?.any(self.heap())
        })
    }

    pub fn test_some<T: Scalar>(
        &self,
        ivars: SymAddr,
        nelems: usize,
        indices: &mut [usize],
        status: Option<&[i32]>,
        cmp: Cmp,
        value: T,
    ) -> Result<usize> {
        self.guard("test_some", || {
            Predicate::new(ivars, nelems, status, cmp, Target::Same(value))?
                .some(self.heap(), indices)
        })
    }

    pub fn test_all_vector<T: Scalar>(
        &self,
        ivars: SymAddr,
        nelems: usize,
        status: Option<&[i32]>,
        cmp: Cmp,
        values: &[T],
    ) -> Result<bool> {
        self.guard("test_all_vector", || {
            Predicate::new(ivars, nelems, status, cmp, Target::Each(values))?.all(self.heap())
        })
    }

    pub fn test_any_vector<T: Scalar>(
        &self,
        ivars: SymAddr,
        nelems: usize,
        status: Option<&[i32]>,
        cmp: Cmp,
        values: &[T],
    ) -> Result<Option<usize>> {
        self.guard("test_any_vector", || {
            Predicate::new(ivars, nelems, status, cmp, Target::Each(values))?.any(self.heap())
        })
    }

    pub fn test_some_vector<T: Scalar>(
        &self,
        ivars: SymAddr,
        nelems: usize,
        indices: &mut [usize],
        status: Option<&[i32]>,
        cmp: Cmp,
        values: &[T],
    ) -> Result<usize> {
        self.guard("test_some_vector", || {
            Predicate::new(ivars, nelems, status, cmp, Target::Each(values))?
                .some(self.heap(), indices)
        })
    }
}

impl std::fmt::Debug for ShmemHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmemHost")
            .field("pe", &self.state.pe)
            .field("n_pes", &self.state.n_pes)
            .finish()
    }
}
