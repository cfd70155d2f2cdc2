//! Exponential retry backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Retry delay policy for failed replication attempts.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
}

impl Backoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms: base_ms.max(1),
            max_ms: max_ms.max(base_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// Doubles per attempt up to `max_ms`, plus up to 25% jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(63);
        let exp = self.base_ms.saturating_mul(1u64 << shift);
        let capped = exp.min(self.max_ms);
        let jitter = rand::rng().random_range(0..=capped / 4);
        Duration::from_millis(capped.saturating_add(jitter))
    }
}
