// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Authenticated outbound HTTP client.
//!
//! Takes a resolved [`RequestDescriptor`], injects the server-held secret
//! according to its [`AuthStyle`], builds the final URL, and executes the
//! call with a per-attempt deadline.
//!
//! Retry policy:
//! - idempotent methods (`GET`, `HEAD`, `OPTIONS`) get `max_retries + 1`
//!   attempts, everything else exactly one
//! - attempt `n` is followed by a `n * base_delay` sleep (linear backoff)
//! - upstream 401/403 ends the sequence immediately
//!
//! Each timeout covers one attempt, not the whole sequence. If the caller
//! goes away mid-call the attempt is dropped, but a non-idempotent request
//! that already reached the upstream cannot be undone.

use crate::config::ClientConfig;
use crate::envelope::UpstreamResponse;
use crate::error::{GatewayError, UpstreamError};
use crate::metrics::Metrics;
use crate::request::{AuthStyle, HttpMethod, RequestDescriptor};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::redirect::Policy;
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

const API_KEY_HEADER: &str = "x-api-key";
const MAX_REDIRECTS: usize = 5;
const MAX_ERROR_MESSAGE_LEN: usize = 512;

/// Caller headers that could smuggle credentials or retarget the request.
const STRIPPED_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "x-api-key",
    "cookie",
    "host",
];

/// Upstream response headers not passed back to the caller.
const HIDDEN_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "set-cookie",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// HTTP client that owns credential injection and retries.
#[derive(Clone)]
pub struct AuthenticatedClient {
    http: reqwest::Client,
    base_delay: Duration,
    metrics: Option<Metrics>,
}

impl AuthenticatedClient {
    /// Create a client. Redirects are followed only while they stay on the
    /// same host, so an allowlisted upstream cannot bounce us elsewhere.
    pub fn new(config: &ClientConfig) -> Result<Self, GatewayError> {
        Self::with_resolved_hosts(config, &[])
    }

    /// Like [`new`](Self::new), but each listed hostname connects to the given
    /// address instead of going through DNS. The port still comes from the
    /// request URL.
    pub fn with_resolved_hosts(
        config: &ClientConfig,
        overrides: &[(&str, SocketAddr)],
    ) -> Result<Self, GatewayError> {
        let redirect = Policy::custom(|attempt| {
            let same_host = attempt
                .previous()
                .first()
                .map(|first| first.host_str() == attempt.url().host_str())
                .unwrap_or(false);

            if attempt.previous().len() > MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if same_host {
                attempt.follow()
            } else {
                attempt.stop()
            }
        });

        let mut builder = reqwest::Client::builder()
            .redirect(redirect)
            .user_agent(concat!("outbound-gateway/", env!("CARGO_PKG_VERSION")));
        for (host, addr) in overrides {
            builder = builder.resolve(host, *addr);
        }

        let http = builder
            .build()
            .map_err(|e| GatewayError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_delay: config.base_delay(),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Execute the call, retrying idempotent methods on retryable failures.
    pub async fn execute(&self, req: RequestDescriptor) -> Result<UpstreamResponse, GatewayError> {
        let started = Instant::now();

        let secret = match (req.auth_style.requires_secret(), req.secret.as_ref()) {
            (true, None) => {
                return Err(GatewayError::Configuration(format!(
                    "auth style {} requires a secret but none is configured",
                    req.auth_style
                )))
            }
            (_, secret) => secret,
        };

        let query = inject_query_secret(req.query.clone(), req.auth_style, &req.query_key_name, secret);
        let headers = build_headers(&req.headers, req.auth_style, secret)?;
        let url = build_url(&req.target_base_url, &req.path, &query)?;

        // Never log the query string: it may hold the secret.
        let log_url = format!("{}{}", url.origin().ascii_serialization(), url.path());
        let max_attempts = if req.method.is_idempotent() {
            req.max_retries.saturating_add(1)
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            if let Some(metrics) = &self.metrics {
                metrics.record_attempt();
            }

            let result = self
                .attempt(req.method, url.clone(), headers.clone(), req.body.as_ref(), req.timeout)
                .await;

            let err = match result {
                Ok(response) => {
                    debug!(
                        url = %log_url,
                        method = %req.method,
                        status = response.status,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Upstream call succeeded"
                    );
                    return Ok(response);
                }
                Err(err) => match secret {
                    Some(secret) => err.redact(secret.expose_secret()),
                    None => err,
                },
            };

            let elapsed = started.elapsed();
            if !err.is_retryable() || attempt >= max_attempts {
                warn!(
                    url = %log_url,
                    method = %req.method,
                    attempt,
                    max_attempts,
                    class = err.class(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %err,
                    "Upstream call failed"
                );
                return Err(GatewayError::Upstream {
                    source: err,
                    attempts: attempt,
                    elapsed,
                });
            }

            let delay = backoff_delay(self.base_delay, attempt);
            warn!(
                url = %log_url,
                method = %req.method,
                attempt,
                max_attempts,
                class = err.class(),
                delay_ms = delay.as_millis() as u64,
                elapsed_ms = elapsed.as_millis() as u64,
                "Retrying upstream call"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_retry();
            }
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(
        &self,
        method: HttpMethod,
        url: Url,
        headers: HeaderMap,
        body: Option<&serde_json::Value>,
        timeout: Duration,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let mut request = self.http.request(method.into(), url).headers(headers);

        if !matches!(method, HttpMethod::Get | HttpMethod::Head) {
            request = match body {
                Some(serde_json::Value::String(text)) => request.body(text.clone()),
                Some(value) => request.json(value),
                None => request,
            };
        }

        match tokio::time::timeout(timeout, send_and_classify(request)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(timeout)),
        }
    }
}

/// Linear backoff: the wait after attempt `n` is `n * base`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

/// Append `path` to the base URL's path and then the query pairs, in order.
///
/// The path only ever lands in the path component, so it cannot change the
/// host the allowlist approved (`//evil.com` becomes the segment `evil.com`).
pub fn build_url(base: &str, path: &str, query: &[(String, String)]) -> Result<Url, GatewayError> {
    let mut url = Url::parse(base.trim())
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid baseUrl: {e}")))?;

    if url.cannot_be_a_base() {
        return Err(GatewayError::InvalidRequest(format!(
            "baseUrl cannot carry a path: {base}"
        )));
    }

    let path = path.trim().trim_start_matches('/');
    if !path.is_empty() {
        let joined = format!("{}/{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
    }

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }

    Ok(url)
}

/// Put the secret into the query under `key_name`, replacing any caller entry
/// of the same name. Only applies to [`AuthStyle::QueryKey`].
fn inject_query_secret(
    mut query: Vec<(String, String)>,
    style: AuthStyle,
    key_name: &str,
    secret: Option<&SecretString>,
) -> Vec<(String, String)> {
    if let (AuthStyle::QueryKey, Some(secret)) = (style, secret) {
        query.retain(|(key, _)| key != key_name);
        query.push((key_name.to_string(), secret.expose_secret().to_string()));
    }
    query
}

/// Caller headers minus anything credential-like, plus the auth header.
fn build_headers(
    caller: &BTreeMap<String, String>,
    style: AuthStyle,
    secret: Option<&SecretString>,
) -> Result<HeaderMap, GatewayError> {
    let mut headers = HeaderMap::new();

    for (name, value) in caller {
        let lower = name.trim().to_ascii_lowercase();
        if STRIPPED_HEADERS.contains(&lower.as_str()) {
            debug!(header = %lower, "Dropping caller-supplied header");
            continue;
        }
        let name = HeaderName::from_bytes(lower.as_bytes())
            .map_err(|_| GatewayError::InvalidRequest(format!("invalid header name: {name}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| GatewayError::InvalidRequest(format!("invalid value for header {lower}")))?;
        headers.insert(name, value);
    }

    if let Some(secret) = secret {
        let slot = match style {
            AuthStyle::Bearer => Some((AUTHORIZATION, format!("Bearer {}", secret.expose_secret()))),
            AuthStyle::HeaderApiKey => Some((
                HeaderName::from_static(API_KEY_HEADER),
                secret.expose_secret().to_string(),
            )),
            AuthStyle::QueryKey | AuthStyle::None => None,
        };

        if let Some((name, value)) = slot {
            let mut value = HeaderValue::from_str(&value).map_err(|_| {
                GatewayError::Configuration("secret is not a valid header value".to_string())
            })?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }
    }

    Ok(headers)
}

async fn send_and_classify(
    request: reqwest::RequestBuilder,
) -> Result<UpstreamResponse, UpstreamError> {
    let response = request.send().await?;
    classify_response(response).await
}

/// Read the body and decide JSON vs text. Non-2xx becomes an error carrying
/// the upstream's own message where one can be found.
async fn classify_response(response: reqwest::Response) -> Result<UpstreamResponse, UpstreamError> {
    let status = response.status().as_u16();
    let headers = visible_headers(response.headers());
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false);

    let text = response.text().await?;
    let (data, is_text) = if is_json && text.trim().is_empty() {
        (serde_json::Value::Null, false)
    } else if is_json {
        match serde_json::from_str(&text) {
            Ok(value) => (value, false),
            Err(_) => (serde_json::Value::String(text), true),
        }
    } else {
        (serde_json::Value::String(text), true)
    };

    if (200..300).contains(&status) {
        Ok(UpstreamResponse {
            status,
            data,
            headers,
            is_text,
        })
    } else {
        Err(UpstreamError::from_status(status, error_message(&data, status)))
    }
}

fn error_message(data: &serde_json::Value, status: u16) -> String {
    let from_json = match data {
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| match map.get("error") {
                Some(serde_json::Value::String(s)) => Some(s.as_str()),
                Some(serde_json::Value::Object(inner)) => {
                    inner.get("message").and_then(|m| m.as_str())
                }
                _ => None,
            })
            .map(str::to_string),
        serde_json::Value::String(text) if !text.trim().is_empty() => {
            Some(text.trim().chars().take(MAX_ERROR_MESSAGE_LEN).collect())
        }
        _ => None,
    };

    from_json.unwrap_or_else(|| format!("HTTP {status}"))
}

fn visible_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut visible: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str();
        if HIDDEN_RESPONSE_HEADERS.contains(&name) {
            continue;
        }
        let Ok(value) = value.to_str() else {
            continue;
        };
        visible
            .entry(name.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    visible
}
