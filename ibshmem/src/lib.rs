mod backoff;
pub mod collective;
pub mod config;
pub mod context;
pub mod error;
mod hash;
pub mod heap;
pub mod host;
pub mod job;
pub mod reduce;
pub mod scalar;
pub mod transport;
pub mod types;
mod wait;
pub mod window;

pub use collective::{
    BARRIER_SYNC_SIZE, BCAST_SYNC_SIZE, REDUCE_MIN_WRKDATA_SIZE, REDUCE_SYNC_SIZE, SYNC_VALUE,
    Team, reduce_wrk_len,
};
pub use config::ShmemConfig;
pub use context::{Context, ContextOptions};
pub use error::{Result, ShmemError};
pub use heap::{Observe, SymmetricAllocator, SymmetricHeap};
pub use host::ShmemHost;
pub use job::JobControl;
pub use reduce::Reducible;
pub use scalar::{AmoScalar, Scalar};
pub use transport::{Fabric, LoopbackFabric, LoopbackTransport, Transport};
pub use types::{Cmp, DataType, OpKind, Pe, ReduceOp, SymAddr};
pub use window::{RemoteDescriptor, RemoteWindow, StaticWindowTable, WindowTable};
