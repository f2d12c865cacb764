// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Destination allowlist (SSRF guard).
//!
//! A target is reachable only if its hostname is an allowlisted host or a
//! subdomain of one. Any name under an allowlisted host counts, whatever its
//! labels look like (`evil.com.ipinfo.io` is in ipinfo.io's zone); set
//! `strict_hosts` to accept exact hostnames only. Loopback names and
//! private/link-local IP literals are refused even if someone puts them on
//! the list.

use crate::config::AllowlistConfig;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::{debug, warn};
use url::{Host, Url};

/// Hostnames that are never reachable, whatever the allowlist says.
const ALWAYS_BLOCKED: &[&str] = &["localhost", "127.0.0.1", "::1", "0.0.0.0"];

/// Why a URL was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    InvalidUrl,
    UnsupportedScheme,
    Loopback,
    PrivateAddress,
    NotAllowlisted,
}

impl BlockReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::UnsupportedScheme => "unsupported_scheme",
            Self::Loopback => "loopback",
            Self::PrivateAddress => "private_address",
            Self::NotAllowlisted => "not_allowlisted",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an allowlist check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    Allowed,
    Blocked(BlockReason),
}

impl GuardVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardVerdict::Allowed)
    }
}

/// Stateless allowlist check over a fixed host list.
#[derive(Debug, Clone)]
pub struct AllowlistGuard {
    hosts: Vec<String>,
    strict: bool,
}

impl AllowlistGuard {
    /// Create a guard from configuration. Entries are lowercased and stripped
    /// of a trailing dot.
    pub fn new(config: AllowlistConfig) -> Self {
        let hosts = config
            .hosts
            .iter()
            .map(|h| normalize_host(h))
            .filter(|h| !h.is_empty())
            .collect();
        Self {
            hosts,
            strict: config.strict_hosts,
        }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// `true` if the URL may be called. Never panics on bad input.
    pub fn is_allowed(&self, url: &str) -> bool {
        self.check(url).is_allowed()
    }

    /// Check a URL, logging a warning on rejection.
    pub fn check(&self, url: &str) -> GuardVerdict {
        let verdict = self.evaluate(url);
        match verdict {
            GuardVerdict::Allowed => debug!(url = %url, "URL allowed"),
            GuardVerdict::Blocked(reason) => warn!(
                url = %url,
                reason = %reason,
                blocked_at = %chrono::Utc::now().to_rfc3339(),
                "Blocked outbound URL"
            ),
        }
        verdict
    }

    fn evaluate(&self, url: &str) -> GuardVerdict {
        let parsed = match Url::parse(url.trim()) {
            Ok(u) => u,
            Err(_) => return GuardVerdict::Blocked(BlockReason::InvalidUrl),
        };

        if !matches!(parsed.scheme(), "http" | "https") {
            return GuardVerdict::Blocked(BlockReason::UnsupportedScheme);
        }

        let hostname = match parsed.host() {
            Some(Host::Domain(domain)) => normalize_host(domain),
            Some(Host::Ipv4(ip)) => {
                if let Some(reason) = blocked_ip(IpAddr::V4(ip)) {
                    return GuardVerdict::Blocked(reason);
                }
                ip.to_string()
            }
            Some(Host::Ipv6(ip)) => {
                if let Some(reason) = blocked_ip(IpAddr::V6(ip)) {
                    return GuardVerdict::Blocked(reason);
                }
                ip.to_string()
            }
            None => return GuardVerdict::Blocked(BlockReason::InvalidUrl),
        };

        if ALWAYS_BLOCKED.contains(&hostname.as_str()) || hostname.ends_with(".localhost") {
            return GuardVerdict::Blocked(BlockReason::Loopback);
        }

        let listed = if self.strict {
            self.hosts.iter().any(|allowed| *allowed == hostname)
        } else {
            self.hosts.iter().any(|allowed| host_matches(&hostname, allowed))
        };
        if listed {
            GuardVerdict::Allowed
        } else {
            GuardVerdict::Blocked(BlockReason::NotAllowlisted)
        }
    }
}

/// Exact match, or a true subdomain (`api.ipinfo.io` matches `ipinfo.io`,
/// `evilipinfo.io` does not).
pub(crate) fn host_matches(hostname: &str, allowed: &str) -> bool {
    hostname == allowed
        || hostname
            .strip_suffix(allowed)
            .is_some_and(|prefix| prefix.len() > 1 && prefix.ends_with('.'))
}

pub(crate) fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_lowercase()
}

fn blocked_ip(ip: IpAddr) -> Option<BlockReason> {
    match ip {
        IpAddr::V4(v4) => blocked_ipv4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => blocked_ipv4(v4),
            None => blocked_ipv6(v6),
        },
    }
}

fn blocked_ipv4(ip: Ipv4Addr) -> Option<BlockReason> {
    if ip.is_loopback() {
        Some(BlockReason::Loopback)
    } else if ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (ip.octets()[0] == 100 && (ip.octets()[1] & 0xc0) == 64)
    {
        Some(BlockReason::PrivateAddress)
    } else {
        None
    }
}

fn blocked_ipv6(ip: Ipv6Addr) -> Option<BlockReason> {
    let first = ip.segments()[0];
    if ip.is_loopback() {
        Some(BlockReason::Loopback)
    } else if ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
    {
        Some(BlockReason::PrivateAddress)
    } else {
        None
    }
}
