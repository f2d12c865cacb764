// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test data generators for attack simulation.

use std::net::{IpAddr, Ipv4Addr};

/// Generate a pool of client ids, as the gateway would derive them.
pub fn generate_clients(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            // 198.18.0.0/15 is reserved for benchmarking
            let b = 18 + ((i >> 16) & 0x01) as u8;
            let c = ((i >> 8) & 0xFF) as u8;
            let d = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(198, b, c, d)).to_string()
        })
        .collect()
}

/// Targets on the default allowlist.
pub fn generate_legitimate_targets() -> Vec<&'static str> {
    vec![
        "https://ipinfo.io",
        "https://ipinfo.io/8.8.8.8/json",
        "https://api.ipstack.com/check",
        "https://api.github.com/users/octocat",
        "https://api.ipgeolocation.io/ipgeo",
        "https://ipapi.co/json/",
    ]
}

/// Internal and metadata endpoints an SSRF attempt would aim for.
pub fn generate_ssrf_targets() -> Vec<&'static str> {
    vec![
        // Loopback
        "http://localhost/admin",
        "http://LOCALHOST:8080",
        "http://localhost./",
        "http://api.localhost/",
        "http://127.0.0.1/",
        "http://127.1.2.3:9000/",
        "http://[::1]/",
        "http://0.0.0.0/",
        // Private ranges
        "http://10.0.0.1/",
        "http://172.16.5.4/",
        "http://192.168.1.1/router",
        "http://100.64.0.1/",
        "http://[fd00::1]/",
        // Cloud metadata
        "http://169.254.169.254/latest/meta-data/",
        "http://[fe80::1]/",
        // IPv4-mapped IPv6 loopback
        "http://[::ffff:127.0.0.1]/",
        "http://[::ffff:10.0.0.1]/",
    ]
}

/// URLs that try to smuggle a disallowed host past a naive string check.
pub fn generate_host_confusion_urls() -> Vec<&'static str> {
    vec![
        "https://ipinfo.io.evil.com/",
        "https://evilipinfo.io/",
        "https://ipinfo.io@evil.com/",
        "https://evil.com/?next=https://ipinfo.io",
        "https://evil.com/ipinfo.io",
        "https://evil.com#ipinfo.io",
        "https://api.github.com.attacker.net/",
    ]
}

/// Inputs that are not usable URLs at all.
pub fn generate_malformed_urls() -> Vec<&'static str> {
    vec![
        "",
        "not-a-url",
        "ipinfo.io",
        "//ipinfo.io",
        "ftp://ipinfo.io/file",
        "file:///etc/passwd",
        "gopher://ipinfo.io/",
        "javascript:alert(1)",
        "data:text/plain,hello",
        "https://",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clients_are_unique() {
        let clients = generate_clients(1000);
        let unique: std::collections::HashSet<_> = clients.iter().collect();
        assert_eq!(unique.len(), 1000);
    }
}
