//! # Summary
//!
//! Delay policies between ballot attempts. Dueling proposers keep
//! preempting each other unless at least one of them waits; randomizing
//! the wait makes it likely that one of them finishes both phases first.

use std::time::Duration;

use rand::Rng;

/// Chooses how long a proposer sleeps before retrying with a higher ballot.
pub trait Backoff: std::fmt::Debug + Send + Sync {
    /// Delay before retry number `attempt`, counting from 1.
    fn delay(&self, attempt: u32) -> Duration;
}

/// Uniformly random delay below an exponentially growing ceiling.
#[derive(Copy, Clone, Debug)]
pub struct Jitter {
    base: Duration,
    cap: Duration,
}

impl Jitter {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Jitter { base, cap }
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Jitter::new(Duration::from_millis(10), Duration::from_secs(1))
    }
}

impl Backoff for Jitter {
    fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.base
            .saturating_mul(1 << attempt.min(16))
            .min(self.cap);
        if ceiling.is_zero() {
            return Duration::ZERO
        }
        let nanos = rand::thread_rng().gen_range(0..=ceiling.as_nanos() as u64);
        Duration::from_nanos(nanos)
    }
}

/// Same delay every time; `Fixed(Duration::ZERO)` retries immediately.
#[derive(Copy, Clone, Debug)]
pub struct Fixed(pub Duration);

impl Backoff for Fixed {
    fn delay(&self, _: u32) -> Duration {
        self.0
    }
}
