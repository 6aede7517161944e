//! Injectable clock for time-dependent security state.
//!
//! Rate-limit windows, CSRF token lifetimes, sessions and audit retention all
//! read time through [`Clock`] so tests can move time without sleeping.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock.
///
/// Clones share the same instant, so a test can hand one clone to the server
/// and keep another to advance time.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a mock clock frozen at the given time.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Create a mock clock from an RFC 3339 string.
    pub fn from_rfc3339(s: &str) -> Result<Self, chrono::ParseError> {
        let now = DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc);
        Ok(Self::new(now))
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("mock clock mutex poisoned");
        *now = *now + by;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("mock clock mutex poisoned")
    }
}

/// Shared clock handle passed to every component.
pub type SharedClock = Arc<dyn Clock>;

/// Configured seconds as a signed duration, saturating at the largest
/// representable span instead of wrapping.
pub fn saturating_secs(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// `at + by`, pinned to the far end of the calendar on overflow.
pub fn saturating_add(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn system_clock_returns_time() {
        assert!(SystemClock.now().year() >= 2024);
    }

    #[test]
    fn mock_clock_is_deterministic() {
        let clock = MockClock::from_rfc3339("2025-01-15T12:00:00Z").unwrap();
        assert_eq!(clock.now().to_rfc3339(), "2025-01-15T12:00:00+00:00");
        assert_eq!(clock.now().to_rfc3339(), "2025-01-15T12:00:00+00:00");
    }

    #[test]
    fn clones_share_advances() {
        let clock = MockClock::from_rfc3339("2025-01-15T12:00:00Z").unwrap();
        let handle = clock.clone();
        handle.advance(Duration::hours(1));
        assert_eq!(clock.now().to_rfc3339(), "2025-01-15T13:00:00+00:00");
    }

    #[test]
    fn oversized_spans_saturate() {
        assert_eq!(saturating_secs(90), Duration::seconds(90));
        assert_eq!(saturating_secs(u64::MAX), Duration::MAX);
        assert!(saturating_secs(u64::MAX) > Duration::zero());

        let now = MockClock::from_rfc3339("2025-01-15T12:00:00Z").unwrap().now();
        assert_eq!(saturating_add(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(saturating_add(now, Duration::hours(1)), now + Duration::hours(1));
    }
}
