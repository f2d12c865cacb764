// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Attack simulation patterns for security testing.

use std::time::Duration;

/// Attack pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of requests to send
    pub total_requests: usize,
    /// Simulated time between requests
    pub interval: Duration,
    /// Number of unique client ids to rotate through
    pub unique_clients: usize,
    /// Share of requests aimed at a blocked target (0.0-1.0)
    pub ssrf_ratio: f64,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            interval: Duration::from_millis(100),
            unique_clients: 1,
            ssrf_ratio: 0.0,
        }
    }
}

/// Predefined attack patterns.
impl AttackConfig {
    /// Single client flood.
    pub fn single_client_flood() -> Self {
        Self {
            total_requests: 200,
            interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    /// Many clients, each under the limit.
    pub fn distributed_attack() -> Self {
        Self {
            total_requests: 500,
            interval: Duration::from_millis(20),
            unique_clients: 100,
            ..Default::default()
        }
    }

    /// Steady trickle below the configured rate.
    pub fn slow_drip() -> Self {
        Self {
            total_requests: 30,
            interval: Duration::from_millis(1_500),
            ..Default::default()
        }
    }

    /// Every request targets an internal address.
    pub fn ssrf_sweep() -> Self {
        Self {
            total_requests: 120,
            interval: Duration::from_millis(10),
            unique_clients: 3,
            ssrf_ratio: 1.0,
        }
    }

    /// Legitimate traffic interleaved with internal targets.
    pub fn mixed_ssrf() -> Self {
        Self {
            total_requests: 100,
            interval: Duration::from_millis(50),
            unique_clients: 5,
            ssrf_ratio: 0.3,
        }
    }

    /// Simulated duration of the run.
    pub fn span(&self) -> Duration {
        self.interval * self.total_requests as u32
    }

    /// Get expected outcomes for this attack pattern.
    pub fn expectations(&self) -> AttackExpectations {
        AttackExpectations {
            min_block_rate: if self.ssrf_ratio >= 1.0 { 1.0 } else { 0.0 },
            all_internal_blocked: true,
        }
    }
}

/// Expected outcomes for an attack.
#[derive(Debug, Clone)]
pub struct AttackExpectations {
    /// Minimum share of requests that must be refused
    pub min_block_rate: f64,
    /// Whether every internal target must be forbidden
    pub all_internal_blocked: bool,
}

/// Deterministic pseudo-random choice from index and ratio.
pub fn pick(ratio: f64, index: usize) -> bool {
    if ratio >= 1.0 {
        true
    } else if ratio <= 0.0 {
        false
    } else {
        (index as f64 * 0.618033988749895) % 1.0 < ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_ratio_is_roughly_respected() {
        let hits = (0..1000).filter(|i| pick(0.3, *i)).count();
        assert!((250..=350).contains(&hits), "got {}", hits);
        assert!(pick(1.0, 7));
        assert!(!pick(0.0, 7));
    }

    #[test]
    fn test_span() {
        assert_eq!(AttackConfig::slow_drip().span(), Duration::from_secs(45));
    }
}
