use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, ShmemError};
use crate::types::Pe;

/// Job-wide teardown switch shared by every PE.
///
/// A contract violation on any PE aborts the job. Every blocking loop checks
/// the flag, so peers stuck waiting on the failed PE return
/// [`ShmemError::JobAborted`] instead of hanging.
#[derive(Debug, Default)]
pub struct JobControl {
    aborted: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the job. The first reason wins.
    pub fn abort(&self, pe: Pe, reason: impl Into<String>) {
        let reason = format!("PE {pe}: {}", reason.into());
        if let Ok(mut slot) = self.reason.lock()
            && slot.is_none()
        {
            tracing::error!(pe, reason = %reason, "aborting job");
            *slot = Some(reason);
        }
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().ok().and_then(|r| r.clone())
    }

    /// `Err(JobAborted)` once any PE has aborted.
    pub fn check(&self) -> Result<()> {
        if self.is_aborted() {
            Err(ShmemError::JobAborted(
                self.reason().unwrap_or_else(|| "unknown".into()),
            ))
        } else {
            Ok(())
        }
    }

    /// Abort the job if `result` is a contract violation, then pass it through.
    pub(crate) fn escalate<T>(&self, pe: Pe, op: &'static str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && e.is_contract_violation()
        {
            tracing::error!(pe, op, error = %e, "contract violation");
            self.abort(pe, format!("{op}: {e}"));
        }
        result
    }
}
