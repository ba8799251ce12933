use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::provider_policy::ProviderPolicy;
use crate::ProviderId;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-adapter politeness throttle.
///
/// Every call first waits for rate budget, then sleeps the fixed pre-call
/// delay. The returned permit must be held for the duration of the network
/// call: callers sharing one adapter are serialized behind it.
#[derive(Clone)]
pub struct Throttle {
    provider: ProviderId,
    limiter: Arc<DirectRateLimiter>,
    clock: DefaultClock,
    pre_call_delay: Duration,
    gate: Arc<Mutex<()>>,
}

/// Exclusive right to issue one call through a throttled adapter.
#[derive(Debug)]
pub struct ThrottlePermit {
    _guard: OwnedMutexGuard<()>,
}

impl Throttle {
    pub fn new(
        provider: ProviderId,
        pre_call_delay: Duration,
        quota_window: Duration,
        quota_limit: u32,
    ) -> Self {
        let clock = DefaultClock::default();
        let quota = quota_from_window(quota_window, quota_limit);
        Self {
            provider,
            limiter: Arc::new(RateLimiter::direct_with_clock(quota, &clock)),
            clock,
            pre_call_delay,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_policy(policy: &ProviderPolicy) -> Self {
        Self::new(
            policy.provider_id,
            policy.pre_call_delay,
            policy.quota_window,
            policy.quota_limit,
        )
    }

    pub const fn pre_call_delay(&self) -> Duration {
        self.pre_call_delay
    }

    /// Waits until this adapter may issue its next call.
    pub async fn acquire(&self) -> ThrottlePermit {
        let guard = Arc::clone(&self.gate).lock_owned().await;

        while let Err(not_until) = self.limiter.check() {
            let wait = not_until.wait_time_from(self.clock.now());
            debug!(
                provider = self.provider.as_str(),
                wait_ms = wait.as_millis() as u64,
                "rate budget exhausted, waiting"
            );
            tokio::time::sleep(wait).await;
        }

        if !self.pre_call_delay.is_zero() {
            debug!(
                provider = self.provider.as_str(),
                delay_ms = self.pre_call_delay.as_millis() as u64,
                "pre-call delay"
            );
            tokio::time::sleep(self.pre_call_delay).await;
        }

        ThrottlePermit { _guard: guard }
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("provider", &self.provider)
            .field("pre_call_delay", &self.pre_call_delay)
            .finish_non_exhaustive()
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let burst = NonZeroU32::new(quota_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}
