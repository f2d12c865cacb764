// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the gateway.
//!
//! Upstream failures are classified where they happen (in the client) so the
//! gateway maps variants to status codes instead of inspecting messages.

use axum::http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single outbound call, as seen by the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream rejected credentials ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("upstream resource not found: {0}")]
    NotFound(String),

    #[error("upstream rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl UpstreamError {
    /// Classify a non-2xx upstream response.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status, message },
            404 => Self::NotFound(message),
            429 => Self::RateLimited(message),
            _ => Self::Status { status, message },
        }
    }

    /// Credential failures are not transient; everything else may be retried
    /// (for idempotent methods).
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unauthorized { .. })
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Status { .. } | Self::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used in logs and metrics.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Unauthorized { .. } => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::RateLimited(_) => "upstream_rate_limited",
            Self::Status { .. } => "upstream_status",
            Self::Transport(_) => "transport",
        }
    }

    /// Replace every occurrence of `secret` (raw or form-encoded) in the
    /// upstream's message. Upstreams sometimes echo the request back.
    pub fn redact(self, secret: &str) -> Self {
        if secret.is_empty() {
            return self;
        }
        let scrub = |message: String| scrub_secret(message, secret);
        match self {
            Self::Unauthorized { status, message } => Self::Unauthorized {
                status,
                message: scrub(message),
            },
            Self::NotFound(message) => Self::NotFound(scrub(message)),
            Self::RateLimited(message) => Self::RateLimited(scrub(message)),
            Self::Status { status, message } => Self::Status {
                status,
                message: scrub(message),
            },
            Self::Transport(message) => Self::Transport(scrub(message)),
            timeout @ Self::Timeout(_) => timeout,
        }
    }
}

const REDACTED: &str = "[REDACTED]";

fn scrub_secret(message: String, secret: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(secret.as_bytes()).collect();
    let message = message.replace(secret, REDACTED);
    if encoded == secret {
        message
    } else {
        message.replace(&encoded, REDACTED)
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        // The URL may carry a query-key secret.
        Self::Transport(err.without_url().to_string())
    }
}

/// Everything that can end a proxy call without an upstream success.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Missing required parameter: baseUrl")]
    MissingBaseUrl,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method {0} not allowed; use POST")]
    MethodNotAllowed(String),

    #[error("Target URL is not on the allowlist: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded; retry after {retry_after_secs}s")]
    RateLimited {
        remaining: u32,
        retry_after_secs: u64,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{source} (after {attempts} attempt(s), {elapsed:?})")]
    Upstream {
        #[source]
        source: UpstreamError,
        attempts: u32,
        elapsed: Duration,
    },
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingBaseUrl | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream { source, .. } => source.status_code(),
        }
    }

    /// Failure class for logs and metrics.
    pub fn class(&self) -> &'static str {
        match self {
            Self::MissingBaseUrl | Self::InvalidRequest(_) | Self::MethodNotAllowed(_) => {
                "validation"
            }
            Self::Forbidden(_) => "forbidden",
            Self::RateLimited { .. } => "rate_limit",
            Self::Configuration(_) => "configuration",
            Self::Upstream { source, .. } => source.class(),
        }
    }

    /// The `error` field of the failure envelope.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::MissingBaseUrl => "Missing baseUrl",
            Self::InvalidRequest(_) => "Invalid request",
            Self::MethodNotAllowed(_) => "Method not allowed",
            Self::Forbidden(_) => "URL not allowed",
            Self::RateLimited { .. } => "Rate limit exceeded",
            Self::Configuration(_) => "Gateway misconfigured",
            Self::Upstream { source, .. } => match source {
                UpstreamError::Timeout(_) => "Request timeout",
                UpstreamError::Unauthorized { .. } => "Authentication failed",
                UpstreamError::NotFound(_) => "Resource not found",
                UpstreamError::RateLimited(_) => "Upstream rate limit exceeded",
                UpstreamError::Status { .. } | UpstreamError::Transport(_) => {
                    "Upstream request failed"
                }
            },
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, GatewayError>;
