//! Predicate evaluation for the `wait_until` / `test` family.
//!
//! Everything here is independent of where the values come from: a
//! [`Predicate`] is evaluated against an [`Observe`] source, and a [`Poller`]
//! repeats an evaluation with tiered backoff until it is satisfied or the job
//! is torn down.

use crate::backoff::Backoff;
use crate::config::ShmemConfig;
use crate::error::{Result, ShmemError};
use crate::heap::Observe;
use crate::job::JobControl;
use crate::scalar::Scalar;
use crate::types::{Cmp, SymAddr};

/// Comparison operand: one value for every index, or one per index.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Target<'a, T> {
    Same(T),
    Each(&'a [T]),
}

impl<T: Scalar> Target<'_, T> {
    fn at(&self, i: usize) -> T {
        match self {
            Target::Same(v) => *v,
            Target::Each(vs) => vs[i],
        }
    }
}

/// `ivars[i] <cmp> target[i]` over an array of `nelems` symmetric scalars.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Predicate<'a, T> {
    ivars: SymAddr,
    nelems: usize,
    status: Option<&'a [i32]>,
    cmp: Cmp,
    target: Target<'a, T>,
}

impl<'a, T: Scalar> Predicate<'a, T> {
    pub(crate) fn single(ivar: SymAddr, cmp: Cmp, value: T) -> Result<Self> {
        Self::new(ivar, 1, None, cmp, Target::Same(value))
    }

    /// `status[i] != 0` excludes index `i`.
    pub(crate) fn new(
        ivars: SymAddr,
        nelems: usize,
        status: Option<&'a [i32]>,
        cmp: Cmp,
        target: Target<'a, T>,
    ) -> Result<Self> {
        if !ivars.is_aligned(T::WIDTH) {
            return Err(ShmemError::Misaligned {
                addr: ivars,
                align: T::WIDTH,
            });
        }
        if let Some(status) = status
            && status.len() < nelems
        {
            return Err(ShmemError::BufferTooSmall {
                what: "status",
                needed: nelems,
                actual: status.len(),
            });
        }
        if let Target::Each(values) = target
            && values.len() < nelems
        {
            return Err(ShmemError::BufferTooSmall {
                what: "comparison values",
                needed: nelems,
                actual: values.len(),
            });
        }
        Ok(Self {
            ivars,
            nelems,
            status,
            cmp,
            target,
        })
    }

    fn active(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nelems).filter(|&i| self.status.is_none_or(|s| s[i] == 0))
    }

    pub(crate) fn has_active(&self) -> bool {
        self.active().next().is_some()
    }

    fn holds<O: Observe + ?Sized>(&self, obs: &O, i: usize) -> Result<bool> {
        let bits = obs.observe(self.ivars.index::<T>(i), T::WIDTH)?;
        Ok(self.cmp.holds(T::from_bits(bits), self.target.at(i)))
    }

    /// Every active index holds. Vacuously true with none active.
    pub(crate) fn all<O: Observe + ?Sized>(&self, obs: &O) -> Result<bool> {
        for i in self.active() {
            if !self.holds(obs, i)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Lowest active index that holds.
    pub(crate) fn any<O: Observe + ?Sized>(&self, obs: &O) -> Result<Option<usize>> {
        for i in self.active() {
            if self.holds(obs, i)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// Write every active index that holds into `indices`, returning the count.
    pub(crate) fn some<O: Observe + ?Sized>(
        &self,
        obs: &O,
        indices: &mut [usize],
    ) -> Result<usize> {
        if indices.len() < self.nelems {
            return Err(ShmemError::BufferTooSmall {
                what: "indices",
                needed: self.nelems,
                actual: indices.len(),
            });
        }
        let mut n = 0;
        for i in self.active() {
            if self.holds(obs, i)? {
                indices[n] = i;
                n += 1;
            }
        }
        Ok(n)
    }
}

/// Repeats an observation until it yields a value.
pub(crate) struct Poller<'a> {
    config: &'a ShmemConfig,
    job: &'a JobControl,
}

impl<'a> Poller<'a> {
    pub(crate) fn new(config: &'a ShmemConfig, job: &'a JobControl) -> Self {
        Self { config, job }
    }

    pub(crate) fn until<R>(&self, mut poll: impl FnMut() -> Result<Option<R>>) -> Result<R> {
        let mut backoff = Backoff::new(self.config);
        loop {
            if let Some(r) = poll()? {
                return Ok(r);
            }
            self.job.check()?;
            backoff.snooze();
        }
    }

    pub(crate) fn all<T: Scalar, O: Observe + ?Sized>(
        &self,
        obs: &O,
        pred: &Predicate<'_, T>,
    ) -> Result<()> {
        self.until(|| Ok(pred.all(obs)?.then_some(())))
    }

    /// `None` straight away when nothing is active.
    pub(crate) fn any<T: Scalar, O: Observe + ?Sized>(
        &self,
        obs: &O,
        pred: &Predicate<'_, T>,
    ) -> Result<Option<usize>> {
        if !pred.has_active() {
            return Ok(None);
        }
        self.until(|| Ok(pred.any(obs)?.map(Some)))
    }

    /// Zero straight away when nothing is active.
    pub(crate) fn some<T: Scalar, O: Observe + ?Sized>(
        &self,
        obs: &O,
        pred: &Predicate<'_, T>,
        indices: &mut [usize],
    ) -> Result<usize> {
        if !pred.has_active() {
            // Still reject a short index buffer.
            return pred.some(&NeverObserved, indices);
        }
        self.until(|| {
            let n = pred.some(obs, indices)?;
            Ok((n > 0).then_some(n))
        })
    }
}

/// Observer for predicates with no active index; never consulted.
struct NeverObserved;

impl Observe for NeverObserved {
    fn observe(&self, addr: SymAddr, width: usize) -> Result<u64> {
        Err(ShmemError::Unregistered {
            addr,
            len: width,
            pe: 0,
        })
    }
}
