// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Proxy pipeline.
//!
//! A call moves through `Received → AllowlistChecked → RateChecked →
//! ProviderResolved → Dispatched` and ends `Completed` or `Failed`. Any
//! stage may fail; failures are turned into the envelope here and nowhere
//! else.

use crate::allowlist::{AllowlistGuard, GuardVerdict};
use crate::client::AuthenticatedClient;
use crate::config::{ClientConfig, SecretStore};
use crate::envelope::{ResponseEnvelope, UpstreamResponse};
use crate::error::{GatewayError, Result};
use crate::limiter::{RateLimitResult, RateLimiter};
use crate::metrics::Metrics;
use crate::providers::ProviderRegistry;
use crate::request::{query_pairs, AuthStyle, HttpMethod, ProxyRequest, RequestDescriptor};
use axum::http::HeaderMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Header carrying the original client address when behind a proxy.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Pipeline stage, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    AllowlistChecked,
    RateChecked,
    ProviderResolved,
    Dispatched,
    Completed,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::AllowlistChecked => "allowlist_checked",
            Self::RateChecked => "rate_checked",
            Self::ProviderResolved => "provider_resolved",
            Self::Dispatched => "dispatched",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one proxy call, ready for the HTTP layer.
#[derive(Debug, Clone)]
pub struct ProxyOutcome {
    pub correlation_id: Uuid,
    pub envelope: ResponseEnvelope,
}

/// The gateway: owns the guard, limiter, registry and client.
pub struct Gateway {
    guard: AllowlistGuard,
    limiter: Arc<RateLimiter>,
    registry: ProviderRegistry,
    client: AuthenticatedClient,
    secrets: SecretStore,
    defaults: ClientConfig,
    metrics: Option<Metrics>,
}

impl Gateway {
    pub fn new(
        guard: AllowlistGuard,
        limiter: Arc<RateLimiter>,
        registry: ProviderRegistry,
        client: AuthenticatedClient,
        secrets: SecretStore,
        defaults: ClientConfig,
    ) -> Self {
        Self {
            guard,
            limiter,
            registry,
            client,
            secrets,
            defaults,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Run one proxy call for `client_id` and produce its envelope.
    pub async fn proxy(&self, request: ProxyRequest, client_id: &str) -> ProxyOutcome {
        let correlation_id = Uuid::new_v4();
        let span = tracing::info_span!("proxy", %correlation_id, client_id);

        let envelope = async {
            let started = Instant::now();
            let result = self.run(request, client_id).await;
            let elapsed = started.elapsed();
            let response_time = elapsed.as_millis() as u64;

            let (outcome, envelope) = match result {
                Ok(response) => {
                    info!(
                        stage = %Stage::Completed,
                        status = response.status,
                        elapsed_ms = response_time,
                        "Proxy call completed"
                    );
                    ("success", ResponseEnvelope::success(response, response_time))
                }
                Err(err) => {
                    let envelope = ResponseEnvelope::failure(&err, response_time);
                    warn!(
                        stage = %Stage::Failed,
                        class = err.class(),
                        status = envelope.status_code().as_u16(),
                        elapsed_ms = response_time,
                        error = %err,
                        "Proxy call failed"
                    );
                    (err.class(), envelope)
                }
            };

            self.observe(outcome, &envelope, elapsed);
            envelope
        }
        .instrument(span)
        .await;

        ProxyOutcome {
            correlation_id,
            envelope,
        }
    }

    /// Record a failure that never reached the pipeline (bad JSON, wrong method).
    pub fn reject(&self, err: &GatewayError) -> ProxyOutcome {
        let correlation_id = Uuid::new_v4();
        let envelope = ResponseEnvelope::failure(err, 0);
        warn!(%correlation_id, class = err.class(), error = %err, "Rejected inbound request");
        self.observe(err.class(), &envelope, Duration::ZERO);
        ProxyOutcome {
            correlation_id,
            envelope,
        }
    }

    async fn run(&self, request: ProxyRequest, client_id: &str) -> Result<UpstreamResponse> {
        debug!(stage = %Stage::Received, provider = ?request.provider, "Processing proxy request");
        let base_url = match request.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => return Err(GatewayError::MissingBaseUrl),
        };
        let method = parse_method(request.method.as_deref())?;
        let requested_style = parse_auth_style(request.auth_style.as_deref())?;

        if let GuardVerdict::Blocked(reason) = self.guard.check(&base_url) {
            debug!(reason = %reason, "Allowlist rejected target");
            return Err(GatewayError::Forbidden(base_url));
        }
        debug!(stage = %Stage::AllowlistChecked, "Target allowed");

        if let RateLimitResult::Limited {
            remaining,
            retry_after,
        } = self.limiter.check(client_id).await
        {
            return Err(GatewayError::RateLimited {
                remaining,
                retry_after_secs: retry_after.as_secs(),
            });
        }
        debug!(stage = %Stage::RateChecked, "Client admitted");

        let descriptor = self.resolve(request, base_url, method, requested_style);
        debug!(
            stage = %Stage::ProviderResolved,
            auth_style = %descriptor.auth_style,
            timeout_ms = descriptor.timeout.as_millis() as u64,
            max_retries = descriptor.max_retries,
            "Request resolved"
        );

        debug!(stage = %Stage::Dispatched, method = %descriptor.method, "Dispatching upstream");
        self.client.execute(descriptor).await
    }

    /// Merge provider settings (which win), caller settings and defaults.
    ///
    /// A named provider only applies when the target is on its own host, so
    /// its secret never travels to another upstream.
    fn resolve(
        &self,
        request: ProxyRequest,
        base_url: String,
        method: HttpMethod,
        requested_style: Option<AuthStyle>,
    ) -> RequestDescriptor {
        let provider = match request.provider.as_deref() {
            Some(name) => match self.registry.get(name) {
                Some(p) if p.serves(&base_url) => Some(p),
                Some(p) => {
                    warn!(
                        provider = %p.name,
                        "Target is not on the provider's host, using caller settings"
                    );
                    None
                }
                None => {
                    debug!(provider = %name, "Unknown provider, using caller settings");
                    None
                }
            },
            None => None,
        };

        let caller_timeout = request
            .timeout_ms
            .map(|ms| ms.min(self.defaults.max_timeout_ms));
        let caller_retries = request
            .max_retries
            .map(|n| n.min(self.defaults.max_retries_cap));

        let (auth_style, query_key_name, timeout_ms, max_retries) = match provider {
            Some(p) => (p.auth_style, p.query_key_name.clone(), p.timeout_ms, p.max_retries),
            None => (
                requested_style.unwrap_or_default(),
                request
                    .query_key_name
                    .clone()
                    .filter(|k| !k.trim().is_empty())
                    .unwrap_or_else(|| "api_key".to_string()),
                caller_timeout.unwrap_or(self.defaults.default_timeout_ms),
                caller_retries.unwrap_or(self.defaults.default_max_retries),
            ),
        };

        let secret = if auth_style.requires_secret() {
            self.secrets.resolve(provider.map(|p| p.name.as_str()))
        } else {
            None
        };

        RequestDescriptor {
            target_base_url: base_url,
            path: request.path.unwrap_or_default(),
            method,
            query: query_pairs(&request.query),
            body: request.body,
            auth_style,
            query_key_name,
            headers: request.headers,
            timeout: Duration::from_millis(timeout_ms),
            max_retries,
            secret,
        }
    }

    fn observe(&self, outcome: &str, envelope: &ResponseEnvelope, elapsed: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.observe(outcome, envelope.status_code().as_u16(), elapsed);
        }
    }
}

fn parse_method(method: Option<&str>) -> Result<HttpMethod> {
    match method.map(str::trim) {
        None | Some("") => Ok(HttpMethod::default()),
        Some(m) => m.parse::<HttpMethod>().map_err(GatewayError::InvalidRequest),
    }
}

fn parse_auth_style(style: Option<&str>) -> Result<Option<AuthStyle>> {
    match style.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<AuthStyle>()
            .map(Some)
            .map_err(GatewayError::InvalidRequest),
    }
}

/// Derive the rate-limit key: first `X-Forwarded-For` entry, else the peer
/// address, with any IPv4-mapped IPv6 prefix removed.
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match forwarded {
        Some(addr) => normalize_address(addr),
        None => peer
            .map(|addr| canonical_ip(addr.ip()).to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    }
}

fn normalize_address(addr: &str) -> String {
    match addr.parse::<IpAddr>() {
        Ok(ip) => canonical_ip(ip).to_string(),
        Err(_) => addr
            .strip_prefix("::ffff:")
            .unwrap_or(addr)
            .to_string(),
    }
}

fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}
