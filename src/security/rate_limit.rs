//! Sliding-window rate limiting with temporary blocking.
//!
//! # State Transitions
//! ```text
//! Open → Blocked: count in current window exceeds max_requests
//! Blocked → Open: now >= blocked_until (count restarts at 1)
//! Open → Open:    window elapsed, count restarts at 1
//! ```

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::clock::{saturating_add, saturating_secs, SharedClock};
use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Per-client counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub window_start: DateTime<Utc>,
    pub count: u32,
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitRecord {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            count: 1,
            blocked_until: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Denied; the client may retry after this many seconds.
    Blocked { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// Process-wide limiter table.
///
/// Each check runs under the map's shard lock for that key, so concurrent
/// requests from one client cannot lose increments.
pub struct RateLimiter {
    records: DashMap<String, RateLimitRecord>,
    max_requests: u32,
    window: Duration,
    block: Duration,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, clock: SharedClock) -> Self {
        Self {
            records: DashMap::new(),
            max_requests: config.max_requests,
            window: saturating_secs(config.window_secs),
            block: saturating_secs(config.block_secs),
            clock,
        }
    }

    pub fn check_and_record(&self, key: &str) -> RateDecision {
        let now = self.clock.now();

        let mut entry = self
            .records
            .entry(key.to_string())
            .or_insert_with(|| RateLimitRecord {
                window_start: now,
                count: 0,
                blocked_until: None,
            });
        let record = entry.value_mut();

        if let Some(until) = record.blocked_until {
            if now < until {
                return RateDecision::Blocked {
                    retry_after_secs: seconds_until(now, until),
                };
            }
            *record = RateLimitRecord::fresh(now);
            return RateDecision::Allowed;
        }

        if now - record.window_start > self.window {
            *record = RateLimitRecord::fresh(now);
            return RateDecision::Allowed;
        }

        record.count += 1;
        if record.count > self.max_requests {
            let until = saturating_add(now, self.block);
            record.blocked_until = Some(until);
            tracing::warn!(
                client = %key,
                count = record.count,
                blocked_until = %until,
                "Rate limit exceeded, blocking client"
            );
            return RateDecision::Blocked {
                retry_after_secs: seconds_until(now, until),
            };
        }

        RateDecision::Allowed
    }

    /// Current record for a client, if any.
    pub fn record(&self, key: &str) -> Option<RateLimitRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop records whose window and block have both lapsed.
    ///
    /// Returns the number of records removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.records.len();
        self.records.retain(|_, record| {
            let blocked = record.blocked_until.is_some_and(|until| now < until);
            blocked || now - record.window_start <= self.window
        });
        let removed = before.saturating_sub(self.records.len());
        metrics::record_table_size("rate_limit", self.records.len());
        removed
    }
}

fn seconds_until(now: DateTime<Utc>, until: DateTime<Utc>) -> u64 {
    let millis = (until - now).num_milliseconds().max(0) as u64;
    millis.div_ceil(1000)
}
