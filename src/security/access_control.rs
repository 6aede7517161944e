//! IP allow-list evaluation.
//!
//! # Responsibilities
//! - Parse allow-list entries (exact IPv4/IPv6 or IPv4 CIDR)
//! - Decide allow/deny for a resolved [`ClientIdentity`]
//! - Hold the process-wide policy behind an atomic swap for runtime overrides
//!
//! # Design Decisions
//! - Evaluation is a pure function of (identity, policy)
//! - IPv6 CIDR entries are accepted but never match
//! - The `unknown` identity is always denied

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::security::client_ip::{normalize_ip, ClientIdentity};

/// A single allow-list rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowEntry {
    Exact(IpAddr),
    Cidr { network: Ipv4Addr, prefix: u8 },
    /// Kept so the entry round-trips through the admin API; never matches.
    Ipv6Cidr(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryParseError {
    #[error("'{0}' is not a valid IP address")]
    InvalidAddress(String),
    #[error("'{0}' has an invalid prefix length")]
    InvalidPrefix(String),
}

impl FromStr for AllowEntry {
    type Err = EntryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((addr, prefix)) => {
                let addr = normalize_ip(addr).ok_or_else(|| EntryParseError::InvalidAddress(s.to_string()))?;
                let prefix: u8 = prefix
                    .parse()
                    .map_err(|_| EntryParseError::InvalidPrefix(s.to_string()))?;
                match addr {
                    IpAddr::V4(network) if prefix <= 32 => Ok(AllowEntry::Cidr { network, prefix }),
                    IpAddr::V6(_) if prefix <= 128 => Ok(AllowEntry::Ipv6Cidr(s.to_string())),
                    _ => Err(EntryParseError::InvalidPrefix(s.to_string())),
                }
            }
            None => normalize_ip(s)
                .map(AllowEntry::Exact)
                .ok_or_else(|| EntryParseError::InvalidAddress(s.to_string())),
        }
    }
}

impl fmt::Display for AllowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllowEntry::Exact(ip) => write!(f, "{}", ip),
            AllowEntry::Cidr { network, prefix } => write!(f, "{}/{}", network, prefix),
            AllowEntry::Ipv6Cidr(raw) => f.write_str(raw),
        }
    }
}

/// `~0 << (32 - prefix)`, with `/0` matching everything.
pub fn prefix_mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix.min(32)))
    }
}

impl AllowEntry {
    pub fn matches(&self, ip: &IpAddr) -> bool {
        match (self, ip) {
            (AllowEntry::Exact(allowed), ip) => {
                allowed == ip || (allowed.is_loopback() && ip.is_loopback())
            }
            (AllowEntry::Cidr { network, prefix }, IpAddr::V4(v4)) => {
                let mask = prefix_mask(*prefix);
                (u32::from(*v4) & mask) == (u32::from(*network) & mask)
            }
            (AllowEntry::Cidr { .. }, IpAddr::V6(_)) => false,
            (AllowEntry::Ipv6Cidr(_), _) => false,
        }
    }
}

/// Allow-list plus development-mode flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    pub allow_entries: Vec<AllowEntry>,
    pub development_mode: bool,
}

impl AccessPolicy {
    /// Parse a policy from configuration strings, failing on the first bad entry.
    pub fn from_entries<S: AsRef<str>>(entries: &[S], development_mode: bool) -> Result<Self, EntryParseError> {
        let allow_entries = entries
            .iter()
            .map(|e| e.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            allow_entries,
            development_mode,
        })
    }

    pub fn is_allowed(&self, identity: &ClientIdentity) -> bool {
        let Some(ip) = identity.addr() else {
            return false;
        };

        if self.development_mode && ip.is_loopback() {
            return true;
        }

        self.allow_entries.iter().any(|entry| entry.matches(&ip))
    }
}

/// Shared, runtime-overridable policy.
///
/// Reads are lock-free; writers go through `rcu` so concurrent overrides
/// never lose an update.
pub struct AccessController {
    policy: ArcSwap<AccessPolicy>,
}

impl AccessController {
    pub fn new(policy: AccessPolicy) -> Self {
        for entry in &policy.allow_entries {
            if let AllowEntry::Ipv6Cidr(raw) = entry {
                tracing::warn!(entry = %raw, "IPv6 CIDR allow-list entries are not supported and will never match");
            }
        }
        if policy.development_mode {
            tracing::warn!("Development mode enabled: loopback clients bypass the allow-list");
        }
        Self {
            policy: ArcSwap::from_pointee(policy),
        }
    }

    pub fn snapshot(&self) -> Arc<AccessPolicy> {
        self.policy.load_full()
    }

    pub fn is_allowed(&self, identity: &ClientIdentity) -> bool {
        self.policy.load().is_allowed(identity)
    }

    /// Add an entry; returns false if an identical entry already exists.
    pub fn add_entry(&self, entry: AllowEntry) -> bool {
        let mut added = false;
        self.policy.rcu(|current| {
            let mut next = AccessPolicy::clone(current);
            added = !next.allow_entries.contains(&entry);
            if added {
                next.allow_entries.push(entry.clone());
            }
            next
        });
        added
    }

    /// Remove an entry; returns false if it was not present.
    pub fn remove_entry(&self, entry: &AllowEntry) -> bool {
        let mut removed = false;
        self.policy.rcu(|current| {
            let mut next = AccessPolicy::clone(current);
            let before = next.allow_entries.len();
            next.allow_entries.retain(|e| e != entry);
            removed = next.allow_entries.len() != before;
            next
        });
        removed
    }
}
