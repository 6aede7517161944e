//! Admin sessions.
//!
//! One admin principal; a session is an opaque random token with an expiry.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::clock::{saturating_add, saturating_secs, SharedClock};
use crate::observability::metrics;

pub struct SessionStore {
    sessions: DashMap<String, DateTime<Utc>>,
    ttl: Duration,
    clock: SharedClock,
}

impl SessionStore {
    pub fn new(ttl_secs: u64, clock: SharedClock) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl: saturating_secs(ttl_secs),
            clock,
        }
    }

    pub fn create(&self) -> String {
        let id = Uuid::new_v4().simple().to_string();
        self.sessions.insert(id.clone(), saturating_add(self.clock.now(), self.ttl));
        metrics::record_table_size("sessions", self.sessions.len());
        id
    }

    pub fn is_valid(&self, id: &str) -> bool {
        let now = self.clock.now();
        let expired = match self.sessions.get(id) {
            Some(expires) => now >= *expires,
            None => return false,
        };
        if expired {
            self.sessions.remove(id);
        }
        !expired
    }

    /// Returns false if the session did not exist.
    pub fn revoke(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.sessions.len();
        self.sessions.retain(|_, expires| now < *expires);
        metrics::record_table_size("sessions", self.sessions.len());
        before.saturating_sub(self.sessions.len())
    }
}

/// Audit-safe reference to a session: a digest prefix, never the bearer token.
pub fn session_ref(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    hex::encode(&digest[..8])
}

/// Compare digests so the comparison time does not depend on the password.
pub fn password_matches(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use std::sync::Arc;

    fn store() -> (SessionStore, MockClock) {
        let clock = MockClock::from_rfc3339("2025-03-01T12:00:00Z").unwrap();
        (SessionStore::new(600, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn sessions_expire() {
        let (store, clock) = store();
        let id = store.create();
        assert!(store.is_valid(&id));
        clock.advance(Duration::seconds(600));
        assert!(!store.is_valid(&id));
        assert!(store.is_empty());
    }

    #[test]
    fn revoked_session_is_invalid() {
        let (store, _clock) = store();
        let id = store.create();
        assert!(store.revoke(&id));
        assert!(!store.revoke(&id));
        assert!(!store.is_valid(&id));
    }

    #[test]
    fn sweep_removes_expired() {
        let (store, clock) = store();
        store.create();
        clock.advance(Duration::seconds(300));
        let live = store.create();
        clock.advance(Duration::seconds(301));
        assert_eq!(store.sweep(), 1);
        assert!(store.is_valid(&live));
    }

    #[test]
    fn session_ref_is_stable_and_opaque() {
        let (store, _clock) = store();
        let id = store.create();
        assert_eq!(session_ref(&id), session_ref(&id));
        assert_eq!(session_ref(&id).len(), 16);
        assert!(!id.contains(&session_ref(&id)));
    }

    #[test]
    fn password_comparison() {
        assert!(password_matches("hunter2", "hunter2"));
        assert!(!password_matches("hunter3", "hunter2"));
        assert!(!password_matches("", "hunter2"));
    }
}
