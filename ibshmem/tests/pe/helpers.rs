use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::time::Duration;

use ibshmem::{ShmemConfig, ShmemHost};

/// Small heaps and a short backoff ladder so oversubscribed test machines
/// hand the CPU around quickly.
pub fn config() -> ShmemConfig {
    ShmemConfig {
        heap_size: 1 << 20,
        spin_iters: 64,
        yield_iters: 512,
        poll_sleep: Duration::from_micros(20),
        ..ShmemConfig::default()
    }
}

/// Run `f` on every PE of a fresh job, one thread per PE, and collect the
/// results in PE order.
pub fn run_pes<R, F>(n_pes: u32, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(&ShmemHost) -> R + Sync,
{
    let hosts = ShmemHost::bootstrap_local(n_pes, config()).unwrap();
    run_on(&hosts, f)
}

/// Like [`run_pes`] over hosts the caller already bootstrapped.
pub fn run_on<R, F>(hosts: &[ShmemHost], f: F) -> Vec<R>
where
    R: Send,
    F: Fn(&ShmemHost) -> R + Sync,
{
    std::thread::scope(|s| {
        let handles: Vec<_> = hosts
            .iter()
            .map(|host| {
                let f = &f;
                s.spawn(move || match catch_unwind(AssertUnwindSafe(|| f(host))) {
                    Ok(r) => r,
                    Err(panic) => {
                        // Release peers blocked on this PE before failing.
                        host.job().abort(host.my_pe(), "test thread panicked");
                        resume_unwind(panic)
                    }
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|p| resume_unwind(p)))
            .collect()
    })
}
