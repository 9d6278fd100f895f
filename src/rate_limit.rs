//! Per-client request limiting.
//!
//! A GCRA token bucket per client IP, backed by `governor`: each address may
//! burst up to `limit` requests, and capacity refills evenly over the window.
//! Unlike a fixed window, requests straddling a window edge cannot exceed
//! the quota.

use governor::clock::{Clock, DefaultClock};
use governor::middleware::StateInformationMiddleware;
use governor::state::keyed::DashMapStateStore;
use governor::Quota;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

use crate::constants::CLIENT_RATE_LIMIT;
use crate::error::ConfigError;

type KeyedLimiter<C> =
    governor::RateLimiter<IpAddr, DashMapStateStore<IpAddr>, C, StateInformationMiddleware>;

/// Outcome of one [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests the client may still burst after this one.
    pub remaining: u32,
    /// How long a rejected client must wait. Zero when allowed.
    pub retry_after: Duration,
}

pub struct RateLimiter<C: Clock = DefaultClock> {
    limiter: KeyedLimiter<C>,
    clock: C,
}

impl<C: Clock> std::fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("tracked", &self.limiter.len())
            .finish()
    }
}

impl RateLimiter {
    /// `CLIENT_RATE_LIMIT` requests per minute per address.
    pub fn new() -> Self {
        Self::with_clock(Quota::per_minute(CLIENT_RATE_LIMIT), DefaultClock::default())
    }

    /// `limit` requests per `window` per address.
    pub fn with_limit(limit: u32, window: Duration) -> Result<Self, ConfigError> {
        Ok(Self::with_clock(quota(limit, window)?, DefaultClock::default()))
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(quota: Quota, clock: C) -> Self {
        let limiter = governor::RateLimiter::dashmap_with_clock(quota, &clock)
            .with_middleware::<StateInformationMiddleware>();
        Self { limiter, clock }
    }

    /// Counts a request from `ip` and decides whether it may proceed.
    ///
    /// Rejected requests consume no capacity.
    pub fn check(&self, ip: IpAddr) -> RateDecision {
        match self.limiter.check_key(&ip) {
            Ok(snapshot) => RateDecision {
                allowed: true,
                remaining: snapshot.remaining_burst_capacity(),
                retry_after: Duration::ZERO,
            },
            Err(not_until) => {
                let retry_after = not_until.wait_time_from(self.clock.now());
                debug!(%ip, ?retry_after, "Client rate limit exceeded");
                RateDecision {
                    allowed: false,
                    remaining: 0,
                    retry_after,
                }
            }
        }
    }

    /// Forgets addresses whose bucket has fully refilled. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        before.saturating_sub(self.limiter.len())
    }

    /// Number of addresses currently tracked.
    pub fn tracked(&self) -> usize {
        self.limiter.len()
    }
}

/// Quota allowing a burst of `limit`, refilled evenly over `window`.
fn quota(limit: u32, window: Duration) -> Result<Quota, ConfigError> {
    let burst = NonZeroU32::new(limit)
        .ok_or_else(|| ConfigError::Invalid("rate limit must be positive".into()))?;
    let quota = Quota::with_period(window / limit)
        .ok_or_else(|| ConfigError::Invalid("rate limit window must be positive".into()))?;
    Ok(quota.allow_burst(burst))
}
