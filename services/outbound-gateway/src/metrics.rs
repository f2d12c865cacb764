// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics for the gateway.
//!
//! Metrics live in an owned [`Registry`] rather than the global default one,
//! so every gateway instance (and every test) starts from zero.

use prometheus::{
    histogram_opts, opts, Encoder, HistogramVec, IntCounter, IntCounterVec, Registry,
    TextEncoder,
};
use std::time::Duration;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    duration: HistogramVec,
    attempts: IntCounter,
    retries: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            opts!(
                "gateway_requests_total",
                "Proxy requests by outcome and returned status"
            ),
            &["outcome", "status"],
        )?;
        let duration = HistogramVec::new(
            histogram_opts!(
                "gateway_request_duration_seconds",
                "Wall-clock time of the whole proxy pipeline"
            ),
            &["outcome"],
        )?;
        let attempts = IntCounter::with_opts(opts!(
            "gateway_upstream_attempts_total",
            "Outbound HTTP attempts, retries included"
        ))?;
        let retries = IntCounter::with_opts(opts!(
            "gateway_upstream_retries_total",
            "Outbound attempts that were retried after a failure"
        ))?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(attempts.clone()))?;
        registry.register(Box::new(retries.clone()))?;

        Ok(Self {
            registry,
            requests,
            duration,
            attempts,
            retries,
        })
    }

    /// Record a finished proxy call. `outcome` is `success` or a failure class.
    pub fn observe(&self, outcome: &str, status: u16, elapsed: Duration) {
        let status = status.to_string();
        self.requests
            .with_label_values(&[outcome, status.as_str()])
            .inc();
        self.duration
            .with_label_values(&[outcome])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_attempt(&self) {
        self.attempts.inc();
    }

    pub fn record_retry(&self) {
        self.retries.inc();
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.get()
    }

    pub fn retries(&self) -> u64 {
        self.retries.get()
    }

    /// Encode all metrics in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = vec![];
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_observations() {
        let metrics = Metrics::new().unwrap();
        metrics.observe("success", 200, Duration::from_millis(12));
        metrics.observe("forbidden", 403, Duration::from_millis(1));
        metrics.record_attempt();
        metrics.record_attempt();
        metrics.record_retry();

        assert_eq!(metrics.attempts(), 2);
        assert_eq!(metrics.retries(), 1);

        let text = metrics.render().unwrap();
        assert!(text.contains("gateway_requests_total{outcome=\"success\",status=\"200\"} 1"));
        assert!(text.contains("gateway_requests_total{outcome=\"forbidden\",status=\"403\"} 1"));
        assert!(text.contains("gateway_upstream_attempts_total 2"));
        assert!(text.contains("gateway_request_duration_seconds_count{outcome=\"success\"} 1"));
    }

    #[test]
    fn test_instances_are_isolated() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_attempt();
        assert_eq!(b.attempts(), 0);
    }
}
