use std::{num::NonZeroU32, time::Duration};

use governor::{
    Quota, RateLimiter as Governor,
    clock::{Clock, DefaultClock},
    middleware::StateInformationMiddleware,
    state::keyed::DefaultKeyedStateStore,
};
use tracing::debug;

/// Tracked clients above which idle entries are pruned on the next check.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_millis(900_000),
        }
    }
}

impl RateLimitConfig {
    /// `max_requests` as a burst, refilled evenly across `window`.
    fn quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.max_requests).unwrap_or(NonZeroU32::MIN);
        let period = self.window / burst.get();

        Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32, reset_after: Duration },
    Limited { retry_after: Duration },
}

type KeyedLimiter =
    Governor<String, DefaultKeyedStateStore<String>, DefaultClock, StateInformationMiddleware>;

/// Per-client request limiter. Each client gets a burst of `max_requests`
/// that refills one request every `window / max_requests`.
pub struct RateLimiter {
    limiter: KeyedLimiter,
    quota: Quota,
    clock: DefaultClock,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let quota = config.quota();
        let limiter = Governor::keyed(quota).with_middleware::<StateInformationMiddleware>();

        Self {
            limiter,
            quota,
            clock: DefaultClock::default(),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Burst size actually enforced, never below one.
    pub fn limit(&self) -> u32 {
        self.config.max_requests.max(1)
    }

    /// Counts one request for `key` and says whether it may proceed.
    pub fn check(&self, key: &str) -> RateDecision {
        if self.limiter.len() > PRUNE_THRESHOLD {
            self.limiter.retain_recent();
            debug!(clients = self.limiter.len(), "Pruned idle rate limit entries");
        }

        match self.limiter.check_key(&key.to_string()) {
            Ok(snapshot) => {
                let remaining = snapshot.remaining_burst_capacity().min(self.limit());

                RateDecision::Allowed {
                    remaining,
                    reset_after: self.quota.replenish_interval() * (self.limit() - remaining),
                }
            }
            Err(not_until) => RateDecision::Limited {
                retry_after: not_until.wait_time_from(self.clock.now()),
            },
        }
    }
}
