//! Request pacing for verification sweeps.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;

/// Spaces successive checks evenly so a sweep never exceeds its
/// requests-per-minute budget. No bursts: the first check runs immediately,
/// each later one waits out the remainder of its slot.
pub struct Throttle {
    limiter: DefaultDirectRateLimiter,
    per_minute: NonZeroU32,
}

impl Throttle {
    pub fn per_minute(rate: u32) -> Self {
        let per_minute = NonZeroU32::new(rate).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(per_minute).allow_burst(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(quota),
            per_minute,
        }
    }

    /// Wait until the next check may run.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    pub fn rate(&self) -> u32 {
        self.per_minute.get()
    }
}
