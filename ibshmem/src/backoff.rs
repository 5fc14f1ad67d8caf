use std::time::Duration;

use crate::config::ShmemConfig;

/// Tiered backoff for poll loops: busy-spin, then yield the thread, then sleep.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    iter: u32,
    spin_iters: u32,
    yield_iters: u32,
    sleep: Duration,
}

impl Backoff {
    pub(crate) fn new(cfg: &ShmemConfig) -> Self {
        Self {
            iter: 0,
            spin_iters: cfg.spin_iters,
            yield_iters: cfg.yield_iters,
            sleep: cfg.poll_sleep,
        }
    }

    pub(crate) fn snooze(&mut self) {
        if self.iter < self.spin_iters {
            std::hint::spin_loop();
        } else if self.iter < self.spin_iters.saturating_add(self.yield_iters) {
            std::thread::yield_now();
        } else {
            std::thread::sleep(self.sleep);
        }
        self.iter = self.iter.saturating_add(1);
    }

    /// Back to spinning after progress was made.
    pub(crate) fn reset(&mut self) {
        self.iter = 0;
    }

    #[cfg(test)]
    pub(crate) fn iterations(&self) -> u32 {
        self.iter
    }
}
