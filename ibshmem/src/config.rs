//! Runtime-configurable tuning parameters for ibshmem.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `IBSHMEM_`) or by constructing a custom `ShmemConfig`.

use std::time::Duration;

/// Tuning parameters for the symmetric heap, transports and poll loops.
#[derive(Debug, Clone)]
pub struct ShmemConfig {
    /// Bytes of symmetric heap per PE, including the internal sync area.
    pub heap_size: usize,

    /// Send-queue depth of each transport channel. A full queue is retried,
    /// never reported to the caller.
    pub queue_depth: usize,

    /// Maximum completions reaped per poll of a completion queue.
    pub poll_batch: usize,

    /// Poll iterations that busy-spin before yielding the thread.
    pub spin_iters: u32,

    /// Poll iterations that yield the thread before sleeping.
    pub yield_iters: u32,

    /// Sleep between polls once spinning and yielding are exhausted.
    pub poll_sleep: Duration,

    /// Number of team sync slots reserved in the heap (including the world team).
    pub max_teams: usize,
}

impl Default for ShmemConfig {
    fn default() -> Self {
        Self {
            heap_size: 16 * 1024 * 1024, // 16 MiB
            queue_depth: 256,
            poll_batch: 64,
            spin_iters: 1000,
            yield_iters: 4000,
            poll_sleep: Duration::from_micros(50),
            max_teams: 32,
        }
    }
}

impl ShmemConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `IBSHMEM_HEAP_SIZE`
    /// - `IBSHMEM_QUEUE_DEPTH`
    /// - `IBSHMEM_POLL_BATCH`
    /// - `IBSHMEM_SPIN_ITERS`
    /// - `IBSHMEM_YIELD_ITERS`
    /// - `IBSHMEM_POLL_SLEEP_US`
    /// - `IBSHMEM_MAX_TEAMS`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(n) = env_parse::<usize>("IBSHMEM_HEAP_SIZE") {
            cfg.heap_size = n;
        }
        if let Some(n) = env_parse::<usize>("IBSHMEM_QUEUE_DEPTH") {
            cfg.queue_depth = n.max(1);
        }
        if let Some(n) = env_parse::<usize>("IBSHMEM_POLL_BATCH") {
            cfg.poll_batch = n.max(1);
        }
        if let Some(n) = env_parse::<u32>("IBSHMEM_SPIN_ITERS") {
            cfg.spin_iters = n;
        }
        if let Some(n) = env_parse::<u32>("IBSHMEM_YIELD_ITERS") {
            cfg.yield_iters = n;
        }
        if let Some(us) = env_parse::<u64>("IBSHMEM_POLL_SLEEP_US") {
            cfg.poll_sleep = Duration::from_micros(us);
        }
        if let Some(n) = env_parse::<usize>("IBSHMEM_MAX_TEAMS") {
            cfg.max_teams = n.max(1);
        }

        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable config override");
            None
        }
    }
}
