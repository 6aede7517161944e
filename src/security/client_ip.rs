//! Client identity resolution.
//!
//! # Responsibilities
//! - Walk the configured proxy headers in precedence order
//! - Split forwarded chains left-to-right
//! - Prefer the first public address; fall back to the first usable one
//! - Normalize IPv4-mapped IPv6 literals and port suffixes
//!
//! # Design Decisions
//! - Which headers are trusted is configuration, never a hardcoded list
//! - The transport peer is always the last candidate
//! - No usable address yields the `unknown` sentinel, which is never allowed

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use axum::http::{HeaderMap, HeaderName};

/// Identity used when no header or peer address yields an IP.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolved client address for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Normalized address, or [`UNKNOWN_CLIENT`].
    pub ip: String,
    pub is_private_or_reserved: bool,
    /// Header and peer values in the order they were considered.
    pub raw_candidates: Vec<String>,
}

impl ClientIdentity {
    pub fn unknown(raw_candidates: Vec<String>) -> Self {
        Self {
            ip: UNKNOWN_CLIENT.to_string(),
            is_private_or_reserved: false,
            raw_candidates,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.ip == UNKNOWN_CLIENT
    }

    /// Parsed address; `None` for the sentinel.
    pub fn addr(&self) -> Option<IpAddr> {
        self.ip.parse().ok()
    }

    /// `127.0.0.0/8` and `::1` are both loopback.
    pub fn is_loopback(&self) -> bool {
        self.addr().is_some_and(|ip| ip.is_loopback())
    }
}

/// Derives a [`ClientIdentity`] from request headers and the peer address.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    trusted_headers: Vec<HeaderName>,
}

impl IdentityResolver {
    /// Header names are matched case-insensitively; invalid names are skipped
    /// (config validation rejects them before this point).
    pub fn new<S: AsRef<str>>(trusted_headers: &[S]) -> Self {
        let trusted_headers = trusted_headers
            .iter()
            .filter_map(|h| HeaderName::from_bytes(h.as_ref().trim().to_ascii_lowercase().as_bytes()).ok())
            .collect();
        Self { trusted_headers }
    }

    pub fn trusted_headers(&self) -> &[HeaderName] {
        &self.trusted_headers
    }

    pub fn resolve(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientIdentity {
        let mut raw_candidates = Vec::new();

        for name in &self.trusted_headers {
            for value in headers.get_all(name) {
                let Ok(value) = value.to_str() else {
                    continue;
                };
                raw_candidates.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string),
                );
            }
        }
        if let Some(peer) = peer {
            raw_candidates.push(peer.ip().to_string());
        }

        let parsed: Vec<IpAddr> = raw_candidates.iter().filter_map(|c| normalize_ip(c)).collect();

        let chosen = parsed
            .iter()
            .find(|ip| !is_private_or_reserved(ip))
            .or_else(|| parsed.first());

        match chosen {
            Some(ip) => ClientIdentity {
                ip: ip.to_string(),
                is_private_or_reserved: is_private_or_reserved(ip),
                raw_candidates,
            },
            None => ClientIdentity::unknown(raw_candidates),
        }
    }
}

/// Parse a header-sourced address.
///
/// Accepts bare literals, `ip:port`, `[v6]:port`, and unwraps IPv4-mapped
/// IPv6 (`::ffff:1.2.3.4`) to plain IPv4.
pub fn normalize_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim().trim_matches('"');
    let ip = raw
        .parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|s| s.ip()))
        .or_else(|| {
            raw.strip_prefix('[')
                .and_then(|r| r.strip_suffix(']'))
                .and_then(|r| r.parse::<IpAddr>().ok())
        })?;

    Some(match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    })
}

pub fn is_private_or_reserved(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}

fn is_private_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (b & 0xc0) == 64)
}

fn is_private_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
}
