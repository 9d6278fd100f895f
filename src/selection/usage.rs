//! In-memory model usage and rate-limit tracking.
//!
//! Records, per `(tier, model)`, when a model was last used and whether that
//! use hit a rate limit. Selection consults it to skip models proactively;
//! records are never deleted and simply become eligible again as they age.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::Tier;
use crate::constants::{RATE_LIMIT_COOLDOWN, RECENT_USE_COOLDOWN};

/// Last observed use of one model in one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageRecord {
    pub last_used: Instant,
    pub rate_limited: bool,
}

/// Process-wide usage store, shared by `Arc`.
#[derive(Debug)]
pub struct UsageTracker {
    records: DashMap<(Tier, String), UsageRecord>,
    rate_limit_cooldown: Duration,
    recent_use_cooldown: Duration,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::with_cooldowns(RATE_LIMIT_COOLDOWN, RECENT_USE_COOLDOWN)
    }

    pub fn with_cooldowns(rate_limit_cooldown: Duration, recent_use_cooldown: Duration) -> Self {
        Self {
            records: DashMap::new(),
            rate_limit_cooldown,
            recent_use_cooldown,
        }
    }

    /// Records a successful use now.
    pub fn mark_used(&self, tier: Tier, model: &str) {
        self.record(tier, model, false);
    }

    /// Records a rate-limited use now.
    pub fn mark_rate_limited(&self, tier: Tier, model: &str) {
        self.record(tier, model, true);
    }

    fn record(&self, tier: Tier, model: &str, rate_limited: bool) {
        debug!(%tier, model, rate_limited, "Recording model usage");
        self.records.insert(
            (tier, model.to_string()),
            UsageRecord {
                last_used: Instant::now(),
                rate_limited,
            },
        );
    }

    /// Whether the model may be selected now.
    pub fn is_eligible(&self, tier: Tier, model: &str) -> bool {
        self.is_eligible_at(tier, model, Instant::now())
    }

    /// Whether the model may be selected at `now`.
    ///
    /// Unknown models are eligible. Known models become eligible once the
    /// cooldown matching their last outcome has fully elapsed.
    pub fn is_eligible_at(&self, tier: Tier, model: &str, now: Instant) -> bool {
        let Some(record) = self.get(tier, model) else {
            return true;
        };
        let cooldown = if record.rate_limited {
            self.rate_limit_cooldown
        } else {
            self.recent_use_cooldown
        };
        now.saturating_duration_since(record.last_used) >= cooldown
    }

    pub fn get(&self, tier: Tier, model: &str) -> Option<UsageRecord> {
        self.records
            .get(&(tier, model.to_string()))
            .map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}
