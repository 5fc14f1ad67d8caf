use crate::types::{DataType, OpKind, Pe, ReduceOp, SymAddr};

pub type Result<T> = std::result::Result<T, ShmemError>;

#[derive(Debug, thiserror::Error)]
pub enum ShmemError {
    #[error("invalid PE {pe}: job has {n_pes} PEs")]
    InvalidPe { pe: Pe, n_pes: u32 },

    #[error("address {addr} (+{len}B) is not registered on PE {pe}")]
    Unregistered { addr: SymAddr, len: usize, pe: Pe },

    #[error("address {addr} is not aligned to {align} bytes")]
    Misaligned { addr: SymAddr, align: usize },

    #[error("{width}-byte atomics are not supported by the transport")]
    UnsupportedAtomicWidth { width: usize },

    #[error("invalid comparison operator code {0}")]
    InvalidComparison(i32),

    #[error("invalid context options {0:#x}")]
    InvalidOptions(i64),

    #[error("reduction {op} is not defined for {dtype}")]
    UnsupportedOp { op: ReduceOp, dtype: DataType },

    #[error("{operation}: participants disagree on collective parameters (leader PE {leader})")]
    CollectiveMismatch {
        operation: &'static str,
        leader: Pe,
    },

    #[error("invalid active set: {reason}")]
    InvalidActiveSet { reason: String },

    #[error("{what}: buffer holds {actual} elements, need {needed}")]
    BufferTooSmall {
        what: &'static str,
        needed: usize,
        actual: usize,
    },

    #[error("symmetric heap exhausted: requested {requested}B, {available}B available")]
    OutOfMemory { requested: usize, available: usize },

    #[error("context misuse: {0}")]
    ContextMisuse(&'static str),

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{op} to PE {pe} at {dest} failed on the fabric: {reason}")]
    OperationFailed {
        op: OpKind,
        pe: Pe,
        dest: SymAddr,
        reason: String,
    },

    #[error("context {0} failed after a transport error")]
    ContextFailed(u64),

    #[error("job aborted: {0}")]
    JobAborted(String),

    #[error("internal lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl ShmemError {
    /// Create a `Transport` error with just a message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `Transport` error with a message and a source error.
    pub fn transport_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Caller contract violations. These tear down the whole job.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidPe { .. }
                | Self::Unregistered { .. }
                | Self::Misaligned { .. }
                | Self::UnsupportedAtomicWidth { .. }
                | Self::InvalidComparison(_)
                | Self::InvalidOptions(_)
                | Self::UnsupportedOp { .. }
                | Self::CollectiveMismatch { .. }
                | Self::InvalidActiveSet { .. }
                | Self::BufferTooSmall { .. }
                | Self::ContextMisuse(_)
        )
    }

    /// Fabric-level failures. These poison the issuing context.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::OperationFailed { .. })
    }
}
