//! Token bucket pacing for probe sweeps.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Caps how many probes a sweep sends per second.
///
/// The bucket holds a single token, so probes are spread evenly over each
/// second instead of leaving in a burst. Clones share one bucket.
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<GovLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    /// Limiter for `rate` probes per second; `None` when `rate` is 0.
    pub fn new(rate: u32) -> Option<Self> {
        let rate = NonZeroU32::new(rate)?;
        let quota = Quota::per_second(rate).allow_burst(nonzero!(1u32));
        Some(Self {
            limiter: Arc::new(GovLimiter::direct(quota)),
        })
    }

    /// Wait until the bucket allows another probe.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}
