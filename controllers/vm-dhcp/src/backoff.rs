//! Retry pacing for failed reconcile passes.
//!
//! Delays grow along the Fibonacci sequence, which ramps up more gently
//! than doubling while still backing off pools that stay broken. A pool
//! usually fails because its agent pod is not ready yet, and a pod event
//! re-enqueues it immediately regardless of the pending delay.

use std::time::Duration;

const MINUTE: u64 = 60;

/// Requeue delay for one pool. With a floor of 1 minute and a ceiling of
/// 10 the progression is 1m, 1m, 2m, 3m, 5m, 8m, then 10m for every
/// further failure.
#[derive(Debug, Clone)]
pub struct RequeueBackoff {
    floor_secs: u64,
    ceiling_secs: u64,
    /// Previous and pending delay, in seconds.
    window: (u64, u64),
}

impl RequeueBackoff {
    #[must_use]
    pub fn minutes(floor: u64, ceiling: u64) -> Self {
        Self {
            floor_secs: floor * MINUTE,
            ceiling_secs: ceiling * MINUTE,
            window: (0, floor * MINUTE),
        }
    }

    /// The delay to apply for the latest failure. Each call slides the
    /// window one step along the sequence, capped at the ceiling.
    pub fn advance(&mut self) -> Duration {
        let (previous, pending) = self.window;
        self.window = (pending, (previous + pending).min(self.ceiling_secs));
        Duration::from_secs(pending)
    }

    /// Drops back to the floor after a clean pass.
    pub fn reset(&mut self) {
        self.window = (0, self.floor_secs);
    }
}
