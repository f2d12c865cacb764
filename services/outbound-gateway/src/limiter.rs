// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sliding-window rate limiter keyed by client id.
//!
//! Each client keeps the timestamps of its admitted requests. A check drops
//! timestamps at or before `now - window`, then admits and records `now` if
//! fewer than `max_requests` remain. The window is `(now - window, now]`.
//!
//! The filter-then-append sequence runs under one write lock, so concurrent
//! requests from the same client cannot both slip past the cap. State is
//! per process; several gateway instances each enforce their own limit.

use crate::config::RateLimitConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Millisecond time source for the limiter.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Monotonic clock measured from limiter construction.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed {
        /// Remaining requests in current window, after this one
        remaining: u32,
    },
    /// Request is rate limited
    Limited {
        /// Always 0 while limited
        remaining: u32,
        /// Hint returned to the caller
        retry_after: Duration,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }
}

/// Thread-safe sliding-window limiter.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    windows: RwLock<HashMap<String, VecDeque<u64>>>,
}

impl RateLimiter {
    /// Create a new rate limiter on the system clock.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit or reject one request for `client_id`. Rejections are not recorded.
    pub async fn check(&self, client_id: &str) -> RateLimitResult {
        let now = self.clock.now_ms();
        let window = self.config.window_ms;
        let max = self.config.max_requests;

        let mut windows = self.windows.write().await;
        let timestamps = windows.entry(client_id.to_string()).or_default();
        evict_expired(timestamps, now, window);

        let count = timestamps.len() as u32;
        if count >= max {
            debug!(client_id, count, max, "Client rate limit exceeded");
            return RateLimitResult::Limited {
                remaining: 0,
                retry_after: Duration::from_secs(self.config.retry_after_secs),
            };
        }

        timestamps.push_back(now);
        RateLimitResult::Allowed {
            remaining: max - count - 1,
        }
    }

    pub async fn is_allowed(&self, client_id: &str) -> bool {
        self.check(client_id).await.is_allowed()
    }

    /// Requests left in the current window. Does not record anything.
    pub async fn remaining(&self, client_id: &str) -> u32 {
        let now = self.clock.now_ms();
        let window = self.config.window_ms;
        let windows = self.windows.read().await;
        let count = windows
            .get(client_id)
            .map(|ts| ts.iter().filter(|&&t| in_window(t, now, window)).count())
            .unwrap_or(0) as u32;
        self.config.max_requests.saturating_sub(count)
    }

    /// Drop clients with no timestamps left in the window.
    pub async fn cleanup(&self) -> usize {
        let now = self.clock.now_ms();
        let window = self.config.window_ms;
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, timestamps| {
            evict_expired(timestamps, now, window);
            !timestamps.is_empty()
        });
        let removed = before - windows.len();
        if removed > 0 {
            debug!(removed, tracked = windows.len(), "Swept idle rate limit entries");
        }
        removed
    }

    /// Number of client ids currently held in memory.
    pub async fn tracked_clients(&self) -> usize {
        self.windows.read().await.len()
    }
}

/// `t > now - window`, written without underflow.
fn in_window(t: u64, now: u64, window: u64) -> bool {
    now.saturating_sub(t) < window
}

fn evict_expired(timestamps: &mut VecDeque<u64>, now: u64, window: u64) {
    while let Some(&oldest) = timestamps.front() {
        if in_window(oldest, now, window) {
            break;
        }
        timestamps.pop_front();
    }
}
