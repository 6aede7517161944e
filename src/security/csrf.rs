//! Single-use CSRF tokens.
//!
//! Tokens are 256 random bits from the OS generator, hex encoded. A token is
//! removed from the table the moment it is presented, so a replay always
//! fails whether or not the first presentation was in time.

use axum::http::Method;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::clock::{saturating_secs, SharedClock};
use crate::config::CsrfConfig;
use crate::observability::metrics;

/// Header carrying the token on mutating requests.
pub const CSRF_HEADER: &str = "x-csrf-token";

const TOKEN_BYTES: usize = 32;

/// GET, HEAD and OPTIONS never need a token.
pub fn requires_token(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

pub struct CsrfTokenStore {
    tokens: DashMap<String, DateTime<Utc>>,
    ttl: Duration,
    clock: SharedClock,
}

impl CsrfTokenStore {
    pub fn new(config: &CsrfConfig, clock: SharedClock) -> Self {
        Self {
            tokens: DashMap::new(),
            ttl: saturating_secs(config.ttl_secs),
            clock,
        }
    }

    pub fn issue(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        self.tokens.insert(token.clone(), self.clock.now());
        metrics::record_table_size("csrf", self.tokens.len());
        token
    }

    /// True exactly once per issued token within its time-to-live.
    pub fn validate_and_consume(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        match self.tokens.remove(token) {
            Some((_, issued_at)) => self.clock.now() - issued_at <= self.ttl,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Remove expired tokens; returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.tokens.len();
        self.tokens.retain(|_, issued_at| now - *issued_at <= self.ttl);
        metrics::record_table_size("csrf", self.tokens.len());
        before.saturating_sub(self.tokens.len())
    }
}

/// Pull the token out of a JSON or form-encoded body.
pub fn token_from_body(body: &[u8], field: &str) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        return json
            .get(field)
            .or_else(|| json.get("csrfToken"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
    }
    url::form_urlencoded::parse(body)
        .find(|(k, _)| k == field)
        .map(|(_, v)| v.into_owned())
}
